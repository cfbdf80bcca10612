//! Lifetime counters and the read-only stats snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

/// Lock-free process-lifetime counters owned by one cache manager.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, enabled: bool, size: usize, capacity: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            enabled,
            size,
            capacity,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_ratio: hit_ratio(hits, misses),
        }
    }
}

/// `None` until at least one lookup has been counted.
fn hit_ratio(hits: u64, misses: u64) -> Option<f64> {
    let total = hits + misses;
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64)
    }
}

/// Point-in-time view of a cache manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// False when configured off or after close.
    pub enabled: bool,
    /// Entries currently stored.
    pub size: usize,
    /// Configured `max_entries`.
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed by expiry or LRU pressure.
    pub evictions: u64,
    /// Stores rejected for lack of capacity.
    pub errors: u64,
    /// `hits / (hits + misses)`; `None` when no lookups were counted.
    pub hit_ratio: Option<f64>,
}

impl CacheStats {
    /// Emit the snapshot as a structured log line.
    pub fn emit(&self, reason: &str) {
        info!(
            event = "cache_stats",
            reason = reason,
            enabled = self.enabled,
            size = self.size,
            capacity = self.capacity,
            hits = self.hits,
            misses = self.misses,
            evictions = self.evictions,
            errors = self.errors,
            hit_ratio = ?self.hit_ratio,
            "Cache stats"
        );
    }
}
