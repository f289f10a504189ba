//! Stable cache keys for image resources
//!
//! A key names one image resource on disk and in the in-flight table.
//! Keys are derived by hashing the card identity, so the same card and
//! variant always produce the same key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum key length accepted by [`CacheKey::new`]
const MAX_KEY_LEN: usize = 128;

/// Number of hash bytes kept in derived keys (32 hex chars)
const HASH_BYTES: usize = 16;

/// Opaque, filesystem-safe identifier for one cached image
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

/// Rejected raw key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cache key '{0}': expected 1-128 characters of [A-Za-z0-9_-]")]
pub struct InvalidKey(pub String);

impl CacheKey {
    /// Validate a raw key
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidKey> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_KEY_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(InvalidKey(raw))
        }
    }

    /// Derive the key for a card printing and image variant
    ///
    /// Fields are length-prefixed before hashing so `("ab", "c")` and
    /// `("a", "bc")` never collide.
    pub fn for_card(name: &str, set: &str, variant: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [name.trim().to_lowercase(), set.trim().to_lowercase(), variant.to_string()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hex::encode(&hasher.finalize()[..HASH_BYTES]))
    }

    /// Derive a key from an image URL
    pub fn for_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        Self(hex::encode(&digest[..HASH_BYTES]))
    }

    /// Borrow the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = InvalidKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
