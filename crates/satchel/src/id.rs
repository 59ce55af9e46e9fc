//! Session id generation.
//!
//! The default generator packs a coarse wall-clock timestamp and a few
//! random bits into one `u64` and writes it in base 62:
//!
//! ```text
//!  63                               10 9          0
//! ┌───────────────────────────────────┬────────────┐
//! │ unix time in ns, low 10 bits zero │ random     │
//! └───────────────────────────────────┴────────────┘
//! ```
//!
//! Ids minted more than ~1µs apart sort in creation order. Ids minted
//! within the same microsecond are told apart by the random bits, but
//! their relative order is arbitrary. Treat ids as collision-resistant
//! keys, not as a sequence counter.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const RANDOM_BITS: u32 = 10;

/// Produces new session ids.
///
/// Must be callable concurrently from every request task without external
/// locking. Any `Fn() -> String + Send + Sync` closure is a generator.
pub trait IdGenerator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn generate(&self) -> String {
        self()
    }
}

/// The default [`IdGenerator`]: time-ordered, base-62 encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeOrderedIds;

impl IdGenerator for TimeOrderedIds {
    fn generate(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let coarse = nanos & !((1u64 << RANDOM_BITS) - 1);
        let noise = rand::rng().random_range(0..(1u64 << RANDOM_BITS));
        encode_base62(coarse | noise)
    }
}

/// Writes `n` in base 62 using `0-9A-Za-z`.
///
/// The alphabet is in ASCII order, so for equal-length strings
/// lexicographic order matches numeric order.
pub fn encode_base62(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(11);
    while n > 0 {
        digits.push(ALPHABET[(n % 62) as usize]);
        n /= 62;
    }
    digits.iter().rev().map(|&b| char::from(b)).collect()
}

/// Parses a base-62 string produced by [`encode_base62`].
///
/// Returns `None` for an empty string, a character outside the alphabet,
/// or a value that overflows `u64`.
pub fn decode_base62(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    s.bytes().try_fold(0u64, |acc, b| {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'A'..=b'Z' => b - b'A' + 10,
            b'a'..=b'z' => b - b'a' + 36,
            _ => return None,
        };
        acc.checked_mul(62)?.checked_add(u64::from(digit))
    })
}
