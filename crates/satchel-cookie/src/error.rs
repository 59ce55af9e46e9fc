//! Error types for cookie sealing.

/// Errors from [`Sealer::seal`](crate::Sealer::seal) and
/// [`Sealer::open`](crate::Sealer::open).
///
/// The session layer treats every `open` failure the same way: as if no
/// cookie had been sent. The variants exist for logging.
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    /// A key was empty or had an unusable length.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),

    /// The cookie values could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The decrypted payload is not a string map.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The token is not in the expected shape (bad base64, missing parts).
    #[error("malformed token")]
    Malformed,

    /// The signature does not match: the token was tampered with, was
    /// signed with another key, or belongs to another cookie name.
    #[error("signature mismatch")]
    InvalidMac,

    /// The token is older than the configured max age.
    #[error("token expired")]
    Expired,

    /// Encryption or decryption failed.
    #[error("cipher failure")]
    Crypto,
}
