//! The Redis-backed [`Store`] implementation.

use std::fmt;

use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use satchel_store::{ConfigError, SessionData, SessionId, Store, StoreError};
use url::Url;

use crate::config::{RedisStoreConfig, SCHEME};

/// A [`Store`] that keeps sessions in Redis.
///
/// Each operation checks a connection out of the pool, issues exactly one
/// command and hands the connection back. Pool exhaustion is bounded by
/// [`RedisStoreConfig::wait_timeout`] and reported as a backend error.
///
/// # Error mapping
///
/// | situation                          | error                              |
/// |------------------------------------|------------------------------------|
/// | no connection available / refused  | `Backend { op: "connect", .. }`    |
/// | `GET` returns nil                  | `NotFound`                         |
/// | `GET` fails                        | `Backend { op: "read", .. }`       |
/// | `SET` / `DEL` fails                | `Backend { op: "write", .. }`      |
/// | stored bytes don't decode          | `Decode { cmd: "GET", .. }`        |
/// | session data doesn't encode        | `Encode { cmd: "SET", .. }`        |
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    /// Creates a store for `url` using the default key prefix.
    ///
    /// # Errors
    /// - [`ConfigError::MalformedUrl`] if `url` doesn't parse
    /// - [`ConfigError::InvalidScheme`] if it isn't a `redis://` URL
    pub fn new(url: &str) -> Result<Self, ConfigError> {
        Self::from_config(RedisStoreConfig::new(url))
    }

    /// Creates a store for `url` with a custom key prefix.
    pub fn with_prefix(
        url: &str,
        key_prefix: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_config(RedisStoreConfig::new(url).key_prefix(key_prefix))
    }

    /// Creates a store from a full configuration.
    ///
    /// No connection is opened here.
    pub fn from_config(config: RedisStoreConfig) -> Result<Self, ConfigError> {
        let parsed = Url::parse(&config.url)?;
        if parsed.scheme() != SCHEME {
            return Err(ConfigError::InvalidScheme {
                found: parsed.scheme().to_string(),
                expected: SCHEME,
            });
        }

        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.wait_timeout);
        pool_config.timeouts.create = Some(config.connect_timeout);
        pool_config.timeouts.recycle = Some(config.connect_timeout);

        let mut redis_config = Config::from_url(config.url.clone());
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ConfigError::Pool(Box::new(e)))?;

        tracing::info!(
            host = parsed.host_str().unwrap_or_default(),
            key_prefix = %config.key_prefix,
            pool_size = config.pool_size,
            "redis session store configured"
        );

        Ok(Self {
            pool,
            key_prefix: config.key_prefix,
        })
    }

    /// The prefix prepended to every session id.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// The Redis key a session id is stored under.
    pub fn key(&self, id: &SessionId) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Checks a connection out of the pool.
    async fn connection(
        &self,
        command: &'static str,
    ) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(|e| {
            tracing::debug!(command, error = %e, "redis pool checkout failed");
            StoreError::backend("connect", command, e)
        })
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .field("pool", &self.pool.status())
            .finish()
    }
}

impl Store for RedisStore {
    async fn get(&self, id: &SessionId) -> Result<SessionData, StoreError> {
        let key = self.key(id);
        let mut conn = self.connection("GET").await?;

        let reply: Option<Vec<u8>> = cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::backend("read", "GET", e))?;

        // A nil reply is the only way Redis says "no such key".
        let Some(bytes) = reply else {
            return Err(StoreError::NotFound);
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(%key, error = %e, "undecodable session record");
            StoreError::decode("GET", e)
        })
    }

    async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
    ) -> Result<(), StoreError> {
        // Encode before checking out a connection so a bad payload never
        // ties up the pool.
        let bytes =
            serde_json::to_vec(data).map_err(|e| StoreError::encode("SET", e))?;
        let key = self.key(id);
        let mut conn = self.connection("SET").await?;

        let _: () = cmd("SET")
            .arg(&key)
            .arg(bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::backend("write", "SET", e))?;

        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        let key = self.key(id);
        let mut conn = self.connection("DEL").await?;

        // DEL replies with the number of keys removed; 0 is fine.
        let _removed: i64 = cmd("DEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::backend("write", "DEL", e))?;

        Ok(())
    }
}
