//! In-memory response caching with TTL expiry, LRU eviction and a
//! background expiry sweeper.

pub mod clock;
pub mod entry;
pub mod key;
pub mod manager;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use key::{CacheKey, ContentHasher, Fingerprint, Sha256Hasher};
pub use manager::{CacheManager, LookupOutcome};
pub use stats::CacheStats;
