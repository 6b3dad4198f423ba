//! Per-conversation session memory.
//!
//! A [`SessionSnapshot`] holds the small state a conversation needs across
//! turns (filters, last query, seen ids, pagination) so the full history
//! never has to be replayed. Every field is optional: absence means
//! "unknown", never "empty".
//!
//! Two interchangeable [`SessionStore`] backends exist: the in-process
//! [`LocalStore`] (TTL + LRU) and, behind the `redis-memory` feature, a
//! remote store with native per-key TTL. [`open_store`] selects one once
//! per process and falls back to the local backend when the remote one is
//! unreachable.

pub mod keywords;
pub mod local;
#[cfg(feature = "redis-memory")]
pub mod redis;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use keywords::Keywords;
pub use local::LocalStore;

use crate::config::Config;
use crate::core::Filters;
use crate::error::MemoryError;

/// Small TTL-bound state of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Filters accumulated over the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    /// Keywords extracted from the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Keywords>,
    /// Query answered by the previous turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_query: Option<String>,
    /// Ids shown by the previous turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_picks: Option<Vec<String>>,
    /// Offset to request on the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
    /// Every id shown in this session, in first-shown order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_ids: Option<Vec<String>>,
    /// Last write, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<u64>,
    /// Expiry, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl SessionSnapshot {
    /// Stamps `last_updated_at` and `expires_at` relative to now.
    pub(crate) fn stamp(&mut self, ttl: std::time::Duration) {
        let now = unix_millis();
        self.last_updated_at = Some(now);
        self.expires_at = Some(expiry_from(now, ttl));
    }

    /// Renews `expires_at` without touching `last_updated_at`.
    pub(crate) fn stamp_expiry(&mut self, ttl: std::time::Duration) {
        self.expires_at = Some(expiry_from(unix_millis(), ttl));
    }
}

fn expiry_from(now: u64, ttl: std::time::Duration) -> u64 {
    now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
}

/// Current time in Unix milliseconds.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Session storage backend.
///
/// Access is read-then-write without locking across calls: two turns on
/// the same session racing each other resolve as last write wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name for logging.
    fn backend(&self) -> &'static str;

    /// Reads a snapshot and renews its TTL. Expired or unknown sessions
    /// return `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    async fn get(&self, session_id: &str) -> Result<Option<SessionSnapshot>, MemoryError>;

    /// Writes a snapshot, resetting its expiry to now + TTL.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    async fn set(&self, session_id: &str, snapshot: SessionSnapshot) -> Result<(), MemoryError>;

    /// Forgets a session.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    async fn reset(&self, session_id: &str) -> Result<(), MemoryError>;
}

/// Opens the session store selected by `config`.
///
/// A configured remote store that cannot be reached, or a build without
/// the `redis-memory` feature, falls back to the in-process backend.
pub async fn open_store(config: &Config) -> Arc<dyn SessionStore> {
    if let Some(url) = &config.redis_url {
        #[cfg(feature = "redis-memory")]
        {
            match redis::RedisStore::connect(url, config.memory_ttl).await {
                Ok(store) => {
                    info!(backend = store.backend(), "session memory ready");
                    return Arc::new(store);
                }
                Err(e) => {
                    warn!(error = %e, "remote session store unavailable; using in-process memory");
                }
            }
        }

        #[cfg(not(feature = "redis-memory"))]
        warn!(
            url = %url,
            "remote session store configured but redis-memory feature is disabled; using in-process memory"
        );
    }

    let store = LocalStore::new(config.memory_ttl, config.memory_max_entries);
    info!(
        backend = store.backend(),
        max_entries = config.memory_max_entries,
        "session memory ready"
    );
    Arc::new(store)
}
