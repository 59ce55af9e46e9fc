//! Cookie handling for Satchel.
//!
//! The session layer needs two things from cookies:
//!
//! 1. **Sealing**: turning `{"id": <session id>}` into an opaque,
//!    tamper-evident token and back ([`Sealer`], [`SecureCookie`])
//! 2. **Wire format**: finding the session cookie in request headers
//!    and rendering a `Set-Cookie` header ([`cookie_values`], [`SetCookie`])
//!
//! Sealing is a trait so hosts that already have a cookie-signing scheme
//! can plug it in instead of [`SecureCookie`].

mod error;
mod seal;
mod wire;

pub use error::SealError;
pub use seal::{DEFAULT_MAX_AGE, SecureCookie, Sealer};
pub use wire::{
    CookieConfig, DEFAULT_COOKIE_NAME, REMOVAL_SENTINEL, RefreshPolicy, SetCookie,
    cookie_values,
};
