//! Session data model and storage contract for Satchel.
//!
//! This crate is the bottom of the stack. It knows nothing about HTTP or
//! cookies; it only defines:
//!
//! 1. **What a session holds**: [`SessionData`], a map of string keys to
//!    tagged [`Value`]s
//! 2. **Where it lives**: the [`Store`] trait, implemented here by
//!    [`MemoryStore`] and by `satchel-redis` for a remote key-value service
//! 3. **What can go wrong**: [`StoreError`] for per-operation failures and
//!    [`ConfigError`] for construction-time misconfiguration
//!
//! # How it fits in the stack
//!
//! ```text
//! Session layer (satchel)  ← loads a session per request, flushes it after
//!     ↕
//! Store layer (this crate, satchel-redis)  ← durable copy of session data
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod memory;
mod store;
mod value;

pub use error::{BoxError, ConfigError, StoreError};
pub use memory::MemoryStore;
pub use store::{SessionId, Store};
pub use value::{SessionData, Value};
