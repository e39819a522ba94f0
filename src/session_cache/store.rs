//! Bounded LRU store for session records
//!
//! Recency is tracked with a monotonically increasing touch counter, so
//! eviction order is strict even for records touched within the same
//! millisecond. A second counter (`generation`) is bumped on every
//! insert/replace and serves as the optimistic-concurrency marker for the
//! refresh-triggered recreation path.

use crate::device::{DeviceSession, SessionKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One cached session
pub struct SessionRecord {
    pub key: SessionKey,
    /// Owned exclusively by the record while cached; handed out as a
    /// borrowed `Arc` clone
    pub session: Arc<dyn DeviceSession>,
    pub last_used_at: DateTime<Utc>,
    /// Recency marker; the smallest value is the LRU eviction candidate
    touched_seq: u64,
    /// Bumped on every insert/replace of this key
    pub generation: u64,
}

/// Result of a lookup under the key lock
pub enum Lookup {
    /// Live record, already touched
    Hit {
        session: Arc<dyn DeviceSession>,
        generation: u64,
    },
    /// Record was cached but stale; popped and handed back for cleanup
    Stale(SessionRecord),
    Miss,
}

/// Ordered, capacity-bounded mapping from session key to session record
pub struct SessionStore {
    records: HashMap<SessionKey, SessionRecord>,
    max_size: usize,
    next_seq: u64,
    next_generation: u64,
}

impl SessionStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: HashMap::new(),
            max_size,
            next_seq: 0,
            next_generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a key, touching the record on a hit. A stale record (idle
    /// past the TTL, or with an inactive session) is popped and returned so
    /// the caller can log it out.
    pub fn lookup(&mut self, key: &SessionKey, ttl: Duration) -> Lookup {
        let stale = match self.records.get(key) {
            None => return Lookup::Miss,
            Some(record) => is_stale(record, ttl),
        };

        if stale {
            let record = self.records.remove(key);
            return match record {
                Some(record) => Lookup::Stale(record),
                None => Lookup::Miss,
            };
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let record = self.records.get_mut(key);
        match record {
            Some(record) => {
                record.last_used_at = Utc::now();
                record.touched_seq = seq;
                Lookup::Hit {
                    session: record.session.clone(),
                    generation: record.generation,
                }
            }
            None => Lookup::Miss,
        }
    }

    /// Insert or replace the record for a key, then evict least-recently-
    /// used entries until the store is within capacity. Returns the new
    /// record's generation and the evicted records (caller logs them out).
    pub fn insert(
        &mut self,
        key: SessionKey,
        session: Arc<dyn DeviceSession>,
    ) -> (u64, Vec<SessionRecord>) {
        self.next_seq += 1;
        self.next_generation += 1;
        let generation = self.next_generation;

        self.records.insert(
            key.clone(),
            SessionRecord {
                key,
                session,
                last_used_at: Utc::now(),
                touched_seq: self.next_seq,
                generation,
            },
        );

        let mut evicted = Vec::new();
        while self.records.len() > self.max_size {
            let oldest = self
                .records
                .values()
                .min_by_key(|r| r.touched_seq)
                .map(|r| r.key.clone());
            match oldest {
                Some(oldest_key) => {
                    if let Some(record) = self.records.remove(&oldest_key) {
                        evicted.push(record);
                    }
                }
                None => break,
            }
        }

        (generation, evicted)
    }

    pub fn pop(&mut self, key: &SessionKey) -> Option<SessionRecord> {
        self.records.remove(key)
    }

    /// Pop a record only if it is still stale. Used by the sweep, which
    /// scans a snapshot without key locks: a record touched between the
    /// scan and the pop stays cached.
    pub fn pop_if_stale(&mut self, key: &SessionKey, ttl: Duration) -> Option<SessionRecord> {
        let stale = self.records.get(key).map(|r| is_stale(r, ttl))?;
        if stale {
            self.records.remove(key)
        } else {
            None
        }
    }

    pub fn peek_generation(&self, key: &SessionKey) -> Option<u64> {
        self.records.get(key).map(|r| r.generation)
    }

    pub fn get_session(&self, key: &SessionKey) -> Option<Arc<dyn DeviceSession>> {
        self.records.get(key).map(|r| r.session.clone())
    }

    /// Keys whose records are currently stale
    pub fn expired_keys(&self, ttl: Duration) -> Vec<SessionKey> {
        self.records
            .values()
            .filter(|r| is_stale(r, ttl))
            .map(|r| r.key.clone())
            .collect()
    }

    /// All keys, least recently used first
    pub fn keys_by_recency(&self) -> Vec<SessionKey> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by_key(|r| r.touched_seq);
        records.iter().map(|r| r.key.clone()).collect()
    }

    /// Snapshot of (key, session) pairs for read-only scans
    pub fn sessions_snapshot(&self) -> Vec<(SessionKey, Arc<dyn DeviceSession>)> {
        self.records
            .values()
            .map(|r| (r.key.clone(), r.session.clone()))
            .collect()
    }

    /// Remove and return every record (shutdown path)
    pub fn drain(&mut self) -> Vec<SessionRecord> {
        self.records.drain().map(|(_, record)| record).collect()
    }

    #[cfg(test)]
    pub fn backdate(&mut self, key: &SessionKey, age: Duration) {
        if let Some(record) = self.records.get_mut(key) {
            record.last_used_at =
                Utc::now() - chrono::Duration::milliseconds(age.as_millis() as i64);
        }
    }
}

fn is_stale(record: &SessionRecord, ttl: Duration) -> bool {
    let age = Utc::now().signed_duration_since(record.last_used_at);
    age.num_milliseconds() > ttl.as_millis() as i64 || !record.session.is_active()
}
