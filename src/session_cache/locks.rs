//! Per-key connection locks
//!
//! One mutex per session key, created on first reference and retained for
//! the process lifetime. Retention is deliberate: dropping a lock when its
//! session is evicted would open a race between "lock not found, create a
//! new one" and a concurrent holder of the old lock instance, so later
//! remove/recreate cycles on a key always serialize through the same lock.

use crate::device::SessionKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Lazily creates and retains one mutual-exclusion lock per session key
pub struct KeyedLockRegistry {
    locks: RwLock<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl KeyedLockRegistry {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Acquire the lock for a key, creating it on first reference.
    ///
    /// The registry-wide lock is held only for the lookup-or-create step,
    /// never while waiting on the per-key lock, so unrelated keys are not
    /// serialized against each other.
    pub async fn acquire(&self, key: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = self.get_or_create_lock(key).await;
        lock.lock_owned().await
    }

    async fn get_or_create_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(key) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of keys with a lock. Diagnostic only: locks are never pruned,
    /// so this grows with the set of keys ever seen.
    pub async fn lock_count(&self) -> usize {
        self.locks.read().await.len()
    }
}

impl Default for KeyedLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
