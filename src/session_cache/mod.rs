//! SessionCache - cached authenticated device sessions
//!
//! ## Responsibilities
//!
//! - One live session per device endpoint, LRU-bounded
//! - Per-key connect serialization (no double-connect for a key)
//! - TTL expiry on lookup and via an explicit sweep
//! - Atomic recreation, with an optimistic guard on the refresh path
//!
//! All device I/O (connect, metadata fetch, logout) happens outside the
//! store lock; store mutations are short and synchronous. The key lock is
//! held for the create/recreate/remove critical sections only, never across
//! the slow metadata refresh.

mod locks;
mod store;

pub use locks::KeyedLockRegistry;
pub use store::{Lookup, SessionRecord, SessionStore};

use crate::config::CacheConfig;
use crate::device::{ConnectParams, DeviceSession, SessionConnector, SessionKey};
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;

/// Cache-level diagnostics for the health/status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub active_sessions: usize,
    pub session_ttl_minutes: u64,
}

/// Process-scoped session cache. Construct one per process (or per test);
/// there is no ambient global state.
pub struct SessionCache {
    connector: Arc<dyn SessionConnector>,
    store: RwLock<SessionStore>,
    locks: KeyedLockRegistry,
    config: CacheConfig,
}

impl SessionCache {
    pub fn new(connector: Arc<dyn SessionConnector>, config: CacheConfig) -> Self {
        Self {
            connector,
            store: RwLock::new(SessionStore::new(config.max_cache_size)),
            locks: KeyedLockRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the cached session for a key, or connect and cache a new one.
    ///
    /// Concurrent callers for the same key serialize through the key lock,
    /// so at most one connect is in flight per key; callers for different
    /// keys proceed in parallel.
    pub async fn get_or_create(
        &self,
        key: &SessionKey,
        params: &ConnectParams,
    ) -> Result<Arc<dyn DeviceSession>> {
        let _guard = self.locks.acquire(key).await;
        let (session, _) = self.get_or_create_locked(key, params).await?;
        Ok(session)
    }

    /// Same as [`get_or_create`](Self::get_or_create), then refresh device
    /// metadata outside the lock. If the refresh reveals new sub-devices the
    /// session is recreated, at most once per topology change even under
    /// concurrent callers.
    pub async fn get_or_create_with_refresh(
        &self,
        key: &SessionKey,
        params: &ConnectParams,
    ) -> Result<Arc<dyn DeviceSession>> {
        let (session, generation) = {
            let _guard = self.locks.acquire(key).await;
            self.get_or_create_locked(key, params).await?
        };

        // Refresh outside the key lock so a multi-second metadata fetch does
        // not block unrelated lookups for this key.
        let refreshed = timeout(self.config.connect_timeout, session.fetch_metadata()).await;
        match refreshed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    session_key = %key,
                    error = %e,
                    "Metadata refresh failed, serving session as-is"
                );
                return Ok(session);
            }
            Err(_) => {
                tracing::warn!(
                    session_key = %key,
                    timeout_secs = self.config.connect_timeout.as_secs(),
                    "Metadata refresh timed out, serving session as-is"
                );
                return Ok(session);
            }
        }

        if !session.has_new_devices() {
            return Ok(session);
        }

        tracing::info!(session_key = %key, "Refresh revealed new devices, recreating session");
        let _guard = self.locks.acquire(key).await;

        // The lock was released across the refresh; another caller may have
        // recreated the session in the interim. The stored generation having
        // advanced past the captured one detects that.
        let current = { self.store.read().await.peek_generation(key) };
        if let Some(current) = current {
            if current != generation {
                if let Some(newer) = { self.store.read().await.get_session(key) } {
                    tracing::debug!(
                        session_key = %key,
                        "Session already recreated by a concurrent caller"
                    );
                    return Ok(newer);
                }
            }
        }

        self.recreate_locked(key, params).await
    }

    /// Unconditionally open a fresh session for a key and replace the cached
    /// record. On failure the previous session, if any, is returned instead:
    /// a possibly-stale session beats total unavailability.
    pub async fn recreate(
        &self,
        key: &SessionKey,
        params: &ConnectParams,
    ) -> Result<Arc<dyn DeviceSession>> {
        let _guard = self.locks.acquire(key).await;
        self.recreate_locked(key, params).await
    }

    /// Remove the cached session for a key, logging it out best-effort.
    /// Returns whether a session existed.
    pub async fn remove(&self, key: &SessionKey) -> bool {
        let _guard = self.locks.acquire(key).await;
        let record = { self.store.write().await.pop(key) };
        match record {
            Some(record) => {
                best_effort_logout(&record.session, key).await;
                tracing::info!(session_key = %key, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Remove every stale record. Scans a snapshot without key locks; each
    /// candidate is re-checked under the store lock before being popped, so
    /// a record touched during the sweep survives. Returns the number
    /// removed.
    pub async fn cleanup_expired(&self) -> usize {
        let candidates = { self.store.read().await.expired_keys(self.config.session_ttl) };
        let mut removed = 0;
        for key in candidates {
            let record = {
                self.store
                    .write()
                    .await
                    .pop_if_stale(&key, self.config.session_ttl)
            };
            if let Some(record) = record {
                best_effort_logout(&record.session, &key).await;
                tracing::info!(session_key = %key, "Expired session removed");
                removed += 1;
            }
        }
        removed
    }

    /// Remove every cached session. Intended for process shutdown.
    pub async fn cleanup_all(&self) {
        let records = { self.store.write().await.drain() };
        if records.is_empty() {
            return;
        }
        tracing::debug!(count = records.len(), "Closing all cached sessions");
        for record in records {
            best_effort_logout(&record.session, &record.key).await;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.store.read().await.len()
    }

    pub fn ttl(&self) -> Duration {
        self.config.session_ttl
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            active_sessions: self.session_count().await,
            session_ttl_minutes: self.config.session_ttl_minutes(),
        }
    }

    /// Number of per-key locks ever created (never pruned)
    pub async fn lock_count(&self) -> usize {
        self.locks.lock_count().await
    }

    /// Cached keys, least recently used first
    pub async fn keys_by_recency(&self) -> Vec<SessionKey> {
        self.store.read().await.keys_by_recency()
    }

    /// Snapshot of cached (key, session) pairs for read-only scans
    pub(crate) async fn sessions_snapshot(&self) -> Vec<(SessionKey, Arc<dyn DeviceSession>)> {
        self.store.read().await.sessions_snapshot()
    }

    /// Fast path shared by the plain and with-refresh entry points. The
    /// caller must hold the key lock.
    async fn get_or_create_locked(
        &self,
        key: &SessionKey,
        params: &ConnectParams,
    ) -> Result<(Arc<dyn DeviceSession>, u64)> {
        let stale = {
            let mut store = self.store.write().await;
            match store.lookup(key, self.config.session_ttl) {
                Lookup::Hit {
                    session,
                    generation,
                } => {
                    tracing::debug!(session_key = %key, "Using cached session");
                    return Ok((session, generation));
                }
                Lookup::Stale(record) => Some(record),
                Lookup::Miss => None,
            }
        };

        if let Some(record) = stale {
            tracing::info!(session_key = %key, "Cached session stale, reconnecting");
            best_effort_logout(&record.session, key).await;
        }

        let session = self.connect(key, params).await?;
        let (generation, evicted) = {
            self.store
                .write()
                .await
                .insert(key.clone(), session.clone())
        };
        for record in evicted {
            tracing::info!(
                session_key = %record.key,
                "Cache full, evicting least recently used session"
            );
            best_effort_logout(&record.session, &record.key).await;
        }

        tracing::info!(session_key = %key, params = %params, "Session established and cached");
        Ok((session, generation))
    }

    /// Recreate body; the caller must hold the key lock.
    async fn recreate_locked(
        &self,
        key: &SessionKey,
        params: &ConnectParams,
    ) -> Result<Arc<dyn DeviceSession>> {
        let previous = { self.store.read().await.get_session(key) };

        let session = match self.connect(key, params).await {
            Ok(session) => session,
            Err(e) => {
                return match previous {
                    Some(prev) => {
                        tracing::warn!(
                            session_key = %key,
                            error = %e,
                            "Recreate failed, previous session retained"
                        );
                        Ok(prev)
                    }
                    None => Err(e),
                };
            }
        };

        let (_, evicted) = {
            self.store
                .write()
                .await
                .insert(key.clone(), session.clone())
        };
        for record in evicted {
            tracing::info!(
                session_key = %record.key,
                "Cache full, evicting least recently used session"
            );
            best_effort_logout(&record.session, &record.key).await;
        }

        // The connect call may hand back a reused handle; only log out a
        // previous session that is actually a different one.
        if let Some(prev) = previous {
            if !Arc::ptr_eq(&prev, &session) {
                best_effort_logout(&prev, key).await;
            }
        }

        tracing::info!(session_key = %key, "Session recreated and cached");
        Ok(session)
    }

    /// Connect + initial metadata fetch under the connect deadline
    async fn connect(
        &self,
        key: &SessionKey,
        params: &ConnectParams,
    ) -> Result<Arc<dyn DeviceSession>> {
        match timeout(self.config.connect_timeout, self.connector.connect(params)).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => {
                tracing::error!(session_key = %key, error = %e, "Failed to connect");
                Err(Error::ConnectFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::error!(
                    session_key = %key,
                    timeout_secs = self.config.connect_timeout.as_secs(),
                    "Timeout connecting"
                );
                Err(Error::ConnectTimeout(key.clone()))
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, key: &SessionKey, age: Duration) {
        self.store.write().await.backdate(key, age);
    }
}

async fn best_effort_logout(session: &Arc<dyn DeviceSession>, key: &SessionKey) {
    if let Err(e) = session.logout().await {
        tracing::warn!(session_key = %key, error = %e, "Error logging out from session");
    }
}
