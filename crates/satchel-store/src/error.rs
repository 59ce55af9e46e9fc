//! Error types for the store layer.
//!
//! Two enums, split by *when* they happen:
//!
//! - [`StoreError`] is returned by individual `get`/`save`/`destroy`
//!   calls while requests are being served.
//! - [`ConfigError`] is returned while wiring things up, before the first
//!   request. These are fatal to startup.

/// A boxed, thread-safe error from a backend library (Redis client, pool,
/// serializer). We keep the original error around so callers can
/// downcast when they need the details.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`Store`](crate::Store) operations.
///
/// Only [`StoreError::NotFound`] is part of normal control flow: the
/// session layer turns it into a fresh session. Every other variant must
/// reach the caller intact.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the requested id.
    #[error("session not found")]
    NotFound,

    /// The backend could not be reached, or rejected the command.
    ///
    /// `op` is the phase that failed (`connect`, `read`, `write`) and
    /// `cmd` is the remote command that was being issued.
    #[error("{op} {cmd}: {source}")]
    Backend {
        op: &'static str,
        cmd: &'static str,
        #[source]
        source: BoxError,
    },

    /// The backend returned bytes that are not a valid session record.
    #[error("decode {cmd}: {source}")]
    Decode {
        cmd: &'static str,
        #[source]
        source: BoxError,
    },

    /// Session data could not be serialized for storage.
    #[error("encode {cmd}: {source}")]
    Encode {
        cmd: &'static str,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    /// Wraps a transport or command failure.
    pub fn backend(
        op: &'static str,
        cmd: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Backend {
            op,
            cmd,
            source: source.into(),
        }
    }

    /// Wraps a deserialization failure for the given command.
    pub fn decode(cmd: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Decode {
            cmd,
            source: source.into(),
        }
    }

    /// Wraps a serialization failure for the given command.
    pub fn encode(cmd: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Encode {
            cmd,
            source: source.into(),
        }
    }

    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// The remote command involved in the failure, if any.
    pub fn command(&self) -> Option<&'static str> {
        match self {
            Self::NotFound => None,
            Self::Backend { cmd, .. }
            | Self::Decode { cmd, .. }
            | Self::Encode { cmd, .. } => Some(cmd),
        }
    }
}

/// Misconfiguration detected while constructing a store or session layer.
///
/// Every variant is reported before any network I/O and before any
/// request is served.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The connection URL could not be parsed at all.
    #[error("malformed url: {0}")]
    MalformedUrl(#[from] url::ParseError),

    /// The URL parsed, but its scheme is not one the store speaks.
    #[error("invalid scheme {found:?}, expected {expected:?}")]
    InvalidScheme {
        found: String,
        expected: &'static str,
    },

    /// The cookie hash secret was empty.
    #[error("secret cannot be empty")]
    MissingSecret,

    /// The cookie encryption secret was empty.
    #[error("block secret cannot be empty")]
    MissingBlockSecret,

    /// No store was provided to the session layer builder.
    #[error("store was not provided")]
    MissingStore,

    /// The connection pool rejected its configuration.
    #[error("connection pool: {0}")]
    Pool(#[source] BoxError),
}
