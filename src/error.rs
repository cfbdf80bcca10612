//! Error types for the response cache.
//!
//! Disabled caches and ordinary misses are not errors; they are reported
//! through [`crate::cache::LookupOutcome`]. Everything here is non-fatal to
//! the owning process.

use thiserror::Error;

/// Errors surfaced by the cache and its configuration layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A store could not free room for a new entry. The caller should
    /// return its upstream result uncached.
    #[error("Cache capacity exhausted (max_entries = {max_entries})")]
    CapacityExhausted { max_entries: usize },

    /// Configuration rejected at load or construction time.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// An enabled cache needs a Tokio runtime to host its sweeper.
    #[error("Cache sweeper requires a Tokio runtime")]
    NoRuntime,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CacheError>;
