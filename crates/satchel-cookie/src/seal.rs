//! Sealing: signed, encrypted cookie tokens.
//!
//! A sealed token is built in three steps:
//!
//! ```text
//! values ──json──→ plaintext ──ChaCha20-Poly1305──→ nonce ‖ ciphertext
//!                                                        │ base64
//!                                                        ▼
//!      base64( timestamp | payload | HMAC-SHA256(name|timestamp|payload) )
//! ```
//!
//! The cookie name is part of the signed message, so a token issued for
//! one cookie cannot be replayed under another. The timestamp is signed
//! too, which is what makes the max-age check trustworthy.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::SealError;

type HmacSha256 = Hmac<Sha256>;

/// How long a sealed token stays valid when no max age is configured.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(86_400 * 30);

const NONCE_LEN: usize = 12;

/// Turns a small string map into an opaque cookie token and back.
///
/// `open` must reject anything `seal` didn't produce for the same `name`.
/// Callers never learn *why* a token was rejected beyond the error
/// variant; a rejected token is treated as absent.
///
/// `Send + Sync + 'static` because one sealer is shared by every request.
pub trait Sealer: Send + Sync + 'static {
    /// Seals `values` into a token for the cookie called `name`.
    fn seal(
        &self,
        name: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, SealError>;

    /// Verifies and decodes a token previously produced by [`seal`](Self::seal).
    fn open(
        &self,
        name: &str,
        token: &str,
    ) -> Result<BTreeMap<String, String>, SealError>;
}

/// The default [`Sealer`]: HMAC-SHA256 for integrity, ChaCha20-Poly1305
/// for confidentiality.
///
/// The encryption key is SHA-256 of the block secret, so any non-empty
/// secret works regardless of length.
#[derive(Clone)]
pub struct SecureCookie {
    signer: HmacSha256,
    cipher: ChaCha20Poly1305,
    max_age: Duration,
}

impl SecureCookie {
    /// Creates a sealer from a hash (signing) secret and a block
    /// (encryption) secret.
    ///
    /// # Errors
    /// Returns [`SealError::InvalidKey`] if either secret is empty.
    pub fn new(hash_key: &[u8], block_key: &[u8]) -> Result<Self, SealError> {
        if hash_key.is_empty() {
            return Err(SealError::InvalidKey("hash key cannot be empty"));
        }
        if block_key.is_empty() {
            return Err(SealError::InvalidKey("block key cannot be empty"));
        }

        let derived = Sha256::digest(block_key);
        let cipher = ChaCha20Poly1305::new_from_slice(&derived)
            .map_err(|_| SealError::InvalidKey("block key has wrong length"))?;

        let signer = <HmacSha256 as Mac>::new_from_slice(hash_key)
            .map_err(|_| SealError::InvalidKey("hash key has wrong length"))?;

        Ok(Self {
            signer,
            cipher,
            max_age: DEFAULT_MAX_AGE,
        })
    }

    /// Sets how old a token may be before [`open`](Sealer::open) rejects it.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// The configured max age.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn mac(&self, name: &str, timestamp: u64, payload: &str) -> HmacSha256 {
        let mut mac = self.signer.clone();
        mac.update(format!("{name}|{timestamp}|{payload}").as_bytes());
        mac
    }

    fn seal_at(
        &self,
        name: &str,
        values: &BTreeMap<String, String>,
        now: u64,
    ) -> Result<String, SealError> {
        let plaintext = serde_json::to_vec(values).map_err(SealError::Encode)?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::rng().random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| SealError::Crypto)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        let payload = URL_SAFE_NO_PAD.encode(sealed);

        let tag = self.mac(name, now, &payload).finalize().into_bytes();
        let token = format!("{now}|{payload}|{}", URL_SAFE_NO_PAD.encode(tag));
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    fn open_at(
        &self,
        name: &str,
        token: &str,
        now: u64,
    ) -> Result<BTreeMap<String, String>, SealError> {
        let decoded = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| SealError::Malformed)?;
        let text = String::from_utf8(decoded).map_err(|_| SealError::Malformed)?;

        let mut parts = text.splitn(3, '|');
        let (Some(timestamp), Some(payload), Some(tag)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(SealError::Malformed);
        };

        // Verify before trusting anything else in the token.
        let timestamp: u64 = timestamp.parse().map_err(|_| SealError::Malformed)?;
        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| SealError::Malformed)?;
        self.mac(name, timestamp, payload)
            .verify_slice(&tag)
            .map_err(|_| {
                tracing::debug!(cookie = name, "sealed cookie failed MAC check");
                SealError::InvalidMac
            })?;

        let age = now.saturating_sub(timestamp);
        if age > self.max_age.as_secs() {
            tracing::debug!(
                cookie = name,
                age_secs = age,
                max_age_secs = self.max_age.as_secs(),
                "sealed cookie expired"
            );
            return Err(SealError::Expired);
        }

        let sealed = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SealError::Malformed)?;
        if sealed.len() < NONCE_LEN {
            return Err(SealError::Malformed);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::Crypto)?;

        serde_json::from_slice(&plaintext).map_err(SealError::Decode)
    }
}

impl Sealer for SecureCookie {
    fn seal(
        &self,
        name: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, SealError> {
        self.seal_at(name, values, unix_now())
    }

    fn open(
        &self,
        name: &str,
        token: &str,
    ) -> Result<BTreeMap<String, String>, SealError> {
        self.open_at(name, token, unix_now())
    }
}

impl std::fmt::Debug for SecureCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("SecureCookie")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
