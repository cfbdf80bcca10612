//! Cache key derivation and payload fingerprints.
//!
//! Keys are a pure function of the prompt text and optional binary payload:
//!
//! - text only: `text:<hash(prompt)>`
//! - with payload: `multimodal:<hash(prompt)>:<hash(payload)>`
//!
//! The key hasher is injectable. Fingerprints always use SHA-256 so a weak
//! key hasher cannot make two different payloads look identical.

use std::fmt;

use sha2::{Digest, Sha256};

/// Content hashing primitive used for key derivation.
///
/// Implementations must be deterministic across calls and process runs.
pub trait ContentHasher: Send + Sync {
    /// Digest `bytes` into a printable string.
    fn digest(&self, bytes: &[u8]) -> String;
}

/// Lowercase hex SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

/// Key under which a response is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `(prompt, payload)` using `hasher`.
    pub fn derive(hasher: &dyn ContentHasher, prompt: &str, payload: Option<&[u8]>) -> Self {
        let prompt_hash = hasher.digest(prompt.as_bytes());
        match payload {
            None => Self(format!("text:{prompt_hash}")),
            Some(bytes) => Self(format!(
                "multimodal:{prompt_hash}:{}",
                hasher.digest(bytes)
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub(crate) fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(20)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 fingerprint of a binary payload stored alongside an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(payload: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(payload)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
