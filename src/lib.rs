//! prompt-cache: an in-process cache for expensive upstream responses.
//!
//! Callers look up a response by prompt text and optional binary payload,
//! and store the upstream result themselves on a miss. See
//! [`cache::CacheManager`].

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheManager, CacheStats, LookupOutcome};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
