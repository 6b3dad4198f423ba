//! Remote session store on Redis.
//!
//! Snapshots are stored as JSON under `huebridge:session:{id}` with a
//! native key TTL. Reads use `GETEX ... EX` so every read renews the TTL;
//! capacity is left to the server's eviction policy.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use super::{SessionSnapshot, SessionStore};
use crate::error::MemoryError;

/// Key prefix for session snapshots.
const KEY_PREFIX: &str = "huebridge:session:";

/// Redis-backed [`SessionStore`].
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    ttl_secs: u64,
}

impl RedisStore {
    /// Connects and verifies the server answers `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Backend`] if the URL is invalid or the server
    /// is unreachable.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, MemoryError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(backend)?;
        debug!(url, "connected to redis");
        Ok(Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    fn key(session_id: &str) -> String {
        format!("{KEY_PREFIX}{session_id}")
    }
}

fn backend(e: redis::RedisError) -> MemoryError {
    MemoryError::Backend {
        message: e.to_string(),
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionSnapshot>, MemoryError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GETEX")
            .arg(Self::key(session_id))
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let mut snapshot: SessionSnapshot = serde_json::from_str(&raw)?;
        snapshot.stamp_expiry(Duration::from_secs(self.ttl_secs));
        Ok(Some(snapshot))
    }

    async fn set(&self, session_id: &str, mut snapshot: SessionSnapshot) -> Result<(), MemoryError> {
        snapshot.stamp(Duration::from_secs(self.ttl_secs));
        let payload = serde_json::to_string(&snapshot)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(session_id), payload, self.ttl_secs)
            .await
            .map_err(backend)
    }

    async fn reset(&self, session_id: &str) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(session_id)).await.map_err(backend)
    }
}
