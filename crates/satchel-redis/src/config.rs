//! Configuration for [`RedisStore`](crate::RedisStore).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Key prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "SESS_";

/// The only URL scheme [`RedisStore`](crate::RedisStore) accepts.
pub const SCHEME: &str = "redis";

/// Connection and keyspace settings for a Redis session store.
///
/// `#[serde(default)]` lets a config file set only the fields it cares
/// about; everything else falls back to [`Default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,

    /// Prepended to every session id to form the Redis key.
    pub key_prefix: String,

    /// Maximum number of pooled connections. Bounds concurrency into Redis.
    pub pool_size: usize,

    /// How long an operation waits for a free pooled connection before
    /// failing with a backend error.
    pub wait_timeout: Duration,

    /// How long opening a new connection may take.
    pub connect_timeout: Duration,
}

impl RedisStoreConfig {
    /// Default settings for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Replaces the key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Replaces the pool size.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Replaces how long an operation waits for a free connection.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            pool_size: 16,
            wait_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
