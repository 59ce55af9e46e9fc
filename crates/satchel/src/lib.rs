//! # Satchel
//!
//! Server-side sessions addressed by a sealed cookie.
//!
//! Satchel gives every client an opaque session id, keeps per-session
//! key/value state in a pluggable [`Store`], and carries the id back and
//! forth in a signed, encrypted cookie.
//!
//! ```text
//! request ─→ SessionLayer::load ─→ handler(Session) ─→ SessionLayer::finish ─→ response
//!                 │   ▲                                      │
//!                 ▼   │ cookie id                            ▼
//!              Store::get                              Store::save
//! ```
//!
//! The session is passed to the handler explicitly; nothing is stashed
//! in ambient request state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use satchel::prelude::*;
//!
//! # async fn run(request: http::Request<()>) -> Result<(), SessionError> {
//! let layer = SessionLayer::builder()
//!     .secret("LymWKG0UvJFCiXLHdeYJTR1xaAcRvrf7")
//!     .block_secret("NxyECgzxiYdMhMbsBrUcAAbyBuqKDrpp")
//!     .store(MemoryStore::new())
//!     .build()?;
//!
//! let response = layer
//!     .handle(request, |_req, session| async move {
//!         let visits = session.get("visits").and_then(|v| v.as_i64()).unwrap_or(0);
//!         session.set("visits", visits + 1);
//!         http::Response::new(format!("visit #{}", visits + 1))
//!     })
//!     .await;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod id;
mod layer;
mod session;

pub use error::SessionError;
pub use id::{IdGenerator, TimeOrderedIds};
pub use layer::{SessionLayer, SessionLayerBuilder};
pub use session::{Session, SessionState};

pub use satchel_cookie as cookie;
pub use satchel_store as store;
#[cfg(feature = "redis")]
pub use satchel_redis as redis;

pub mod prelude {
    pub use crate::{
        IdGenerator, Session, SessionError, SessionLayer, SessionLayerBuilder,
        SessionState, TimeOrderedIds,
    };
    pub use satchel_cookie::{CookieConfig, RefreshPolicy, Sealer, SecureCookie};
    pub use satchel_store::{
        ConfigError, MemoryStore, SessionData, SessionId, Store, StoreError, Value,
    };

    #[cfg(feature = "redis")]
    pub use satchel_redis::{RedisStore, RedisStoreConfig};
}
