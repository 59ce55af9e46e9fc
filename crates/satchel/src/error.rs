//! Unified error type for the session layer.

use satchel_cookie::SealError;
use satchel_store::{ConfigError, StoreError};

/// Top-level error that wraps the errors of every layer below.
///
/// The `#[from]` attributes let `?` convert store, config and seal errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The layer or a store was misconfigured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sealing the session cookie failed.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// A cookie attribute produced a header value HTTP can't carry.
    #[error("invalid Set-Cookie header: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

impl SessionError {
    /// Returns `true` if a request hitting this error should fail with
    /// `500 Internal Server Error`.
    ///
    /// Configuration errors happen before serving and a missing record
    /// never reaches the caller, so neither counts.
    pub fn is_internal(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Store(err) => !err.is_not_found(),
            Self::Seal(_) | Self::InvalidHeader(_) => true,
        }
    }
}
