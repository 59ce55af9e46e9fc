//! Redis-backed session store for Satchel.
//!
//! [`RedisStore`] implements [`satchel_store::Store`] on top of a pooled
//! Redis connection. Every session lives under `<prefix><id>` as one
//! opaque serialized blob, written with `SET`, read with `GET` and removed
//! with `DEL`.
//!
//! Construction validates the URL but does not connect. Connections are
//! opened lazily by the pool on first use, so an unreachable server shows
//! up as a [`StoreError::Backend`](satchel_store::StoreError::Backend) on
//! the first real operation rather than at startup.

mod config;
mod store;

pub use config::{DEFAULT_KEY_PREFIX, RedisStoreConfig, SCHEME};
pub use store::RedisStore;

/// The Redis client error carried by `read` and `write` backend errors.
pub use deadpool_redis::redis::RedisError;
