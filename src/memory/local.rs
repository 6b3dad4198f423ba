//! In-process session store with TTL and LRU eviction.
//!
//! Entries expire lazily: an expired entry is dropped by the `get` that
//! finds it, there is no sweeper task. Recency is tracked with a
//! monotonically increasing access tick; `order` maps tick to key, so the
//! least recently touched key is always the first entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use super::{SessionSnapshot, SessionStore};
use crate::error::MemoryError;

struct Entry {
    snapshot: SessionSnapshot,
    deadline: Instant,
    tick: u64,
}

#[derive(Default)]
struct Lru {
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    next_tick: u64,
}

impl Lru {
    fn next_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    /// Moves `key` to the most recently used end.
    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.tick);
            entry.tick = tick;
            self.order.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        Some(entry)
    }

    /// Evicts least recently used entries until at most `max` remain.
    fn evict_to(&mut self, max: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            debug!(session = %key, "evicted least recently used session");
            evicted += 1;
        }
        evicted
    }
}

/// In-process [`SessionStore`].
pub struct LocalStore {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<Lru>,
}

impl LocalStore {
    /// Creates a store. `max_entries` is clamped to at least one.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            inner: Mutex::new(Lru::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lru> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live or not-yet-collected entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` when no entry is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_sync(&self, session_id: &str) -> Option<SessionSnapshot> {
        let now = Instant::now();
        let mut lru = self.lock();
        let expired = lru.entries.get(session_id)?.deadline <= now;
        if expired {
            lru.remove(session_id);
            debug!(session = %session_id, "session expired");
            return None;
        }

        lru.touch(session_id);
        let entry = lru.entries.get_mut(session_id)?;
        entry.deadline = now + self.ttl;
        entry.snapshot.stamp_expiry(self.ttl);
        Some(entry.snapshot.clone())
    }

    fn set_sync(&self, session_id: &str, mut snapshot: SessionSnapshot) {
        snapshot.stamp(self.ttl);
        let deadline = Instant::now() + self.ttl;
        let mut lru = self.lock();
        let tick = lru.next_tick();
        if let Some(old) = lru.entries.insert(
            session_id.to_string(),
            Entry {
                snapshot,
                deadline,
                tick,
            },
        ) {
            lru.order.remove(&old.tick);
        }
        lru.order.insert(tick, session_id.to_string());
        lru.evict_to(self.max_entries);
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("len", &self.len())
            .finish()
    }
}

#[async_trait]
impl SessionStore for LocalStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionSnapshot>, MemoryError> {
        Ok(self.get_sync(session_id))
    }

    async fn set(&self, session_id: &str, snapshot: SessionSnapshot) -> Result<(), MemoryError> {
        self.set_sync(session_id, snapshot);
        Ok(())
    }

    async fn reset(&self, session_id: &str) -> Result<(), MemoryError> {
        self.lock().remove(session_id);
        Ok(())
    }
}
