//! The response cache manager.
//!
//! A keyed in-memory store with fixed per-entry TTL, a hard capacity bound
//! (expired sweep first, then one access-count-first LRU eviction) and a
//! background sweeper running on the Tokio runtime.
//!
//! Callers look up first and store after their upstream call on a miss:
//!
//! ```no_run
//! # async fn demo() -> prompt_cache::Result<()> {
//! use prompt_cache::cache::{CacheManager, LookupOutcome};
//! use prompt_cache::config::CacheConfig;
//!
//! let cache = CacheManager::new(CacheConfig { enabled: true, ..Default::default() })?;
//! match cache.lookup("describe this dish", None) {
//!     LookupOutcome::Hit(body) => println!("{body}"),
//!     _ => {
//!         let body = String::from("...upstream response...");
//!         // A full cache is not fatal; the response is still returned.
//!         let _ = cache.store("describe this dish", None, body.clone());
//!         println!("{body}");
//!     }
//! }
//! cache.close();
//! # Ok(())
//! # }
//! ```
//!
//! Locking: the store sits behind one `RwLock`. Lookups classify the entry
//! under the shared lock, then release it and take the exclusive lock for
//! any mutation (hit bookkeeping or expiry removal). The exclusive re-check
//! is authoritative, so a fresh store that lands between the two phases is
//! never removed by a stale expiry decision.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::entry::CacheEntry;
use super::key::{CacheKey, ContentHasher, Fingerprint, Sha256Hasher};
use super::stats::{CacheStats, Counters};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Result of [`CacheManager::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Live entry found; carries the cached response.
    Hit(String),
    /// Absent or expired.
    Miss,
    /// The text matched a live entry but the accompanying binary payload
    /// differs from the one it was stored with.
    ContentChanged,
    /// The cache is configured off or has been closed.
    Disabled,
}

impl LookupOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, LookupOutcome::Hit(_))
    }

    /// The cached value, if this was a hit.
    pub fn into_value(self) -> Option<String> {
        match self {
            LookupOutcome::Hit(value) => Some(value),
            _ => None,
        }
    }
}

type EntryMap = HashMap<CacheKey, CacheEntry>;

struct Shared {
    enabled: bool,
    max_entries: usize,
    ttl: Duration,
    closed: AtomicBool,
    entries: RwLock<EntryMap>,
    counters: Counters,
    hasher: Arc<dyn ContentHasher>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn is_active(&self) -> bool {
        self.enabled && !self.closed.load(Ordering::Acquire)
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, EntryMap> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, EntryMap> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Optimistic lookup under the shared lock. Returns `None` when the
    /// entry is expired or live, leaving the decision to [`Self::resolve`].
    ///
    /// Misses are counted while the shared lock is held, so `close` (which
    /// takes the exclusive lock before its final snapshot) never observes a
    /// counter change after it.
    fn classify(
        &self,
        key: &CacheKey,
        fingerprint: Option<&Fingerprint>,
    ) -> Option<LookupOutcome> {
        let now = self.clock.now();
        let entries = self.read_entries();
        if self.closed.load(Ordering::Acquire) {
            return Some(LookupOutcome::Disabled);
        }
        match entries.get(key) {
            None => {
                self.counters.record_miss();
                debug!(key = %key.short(), "Cache miss");
                Some(LookupOutcome::Miss)
            }
            Some(entry) if !entry.is_expired(now) && !entry.matches_payload(fingerprint) => {
                self.counters.record_miss();
                debug!(key = %key.short(), "Cache miss (content changed)");
                Some(LookupOutcome::ContentChanged)
            }
            Some(_) => None,
        }
    }

    /// Authoritative lookup under the exclusive lock.
    fn resolve(&self, key: &CacheKey, fingerprint: Option<&Fingerprint>) -> LookupOutcome {
        let mut entries = self.write_entries();
        if self.closed.load(Ordering::Acquire) {
            return LookupOutcome::Disabled;
        }
        let now = self.clock.now();
        let Some(entry) = entries.get_mut(key) else {
            self.counters.record_miss();
            debug!(key = %key.short(), "Cache miss (entry disappeared)");
            return LookupOutcome::Miss;
        };
        if entry.is_expired(now) {
            entries.remove(key);
            self.counters.record_evictions(1);
            info!(key = %key.short(), "Cache entry expired, removing");
            return LookupOutcome::Miss;
        }
        if !entry.matches_payload(fingerprint) {
            self.counters.record_miss();
            debug!(key = %key.short(), "Cache miss (content changed)");
            return LookupOutcome::ContentChanged;
        }
        entry.touch(now);
        let value = entry.value.clone();
        self.counters.record_hit();
        debug!(key = %key.short(), access_count = entry.access_count, "Cache hit");
        LookupOutcome::Hit(value)
    }

    /// Remove every expired entry. Caller holds the exclusive lock.
    fn remove_expired(&self, entries: &mut EntryMap, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        self.counters.record_evictions(removed as u64);
        removed
    }

    /// Evict the single lowest-ranked entry. Caller holds the exclusive lock.
    fn evict_lru(&self, entries: &mut EntryMap) {
        let victim = entries
            .iter()
            .min_by_key(|(_, entry)| entry.eviction_rank())
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            info!(key = %key.short(), "Evicting LRU cache entry");
            entries.remove(&key);
            self.counters.record_evictions(1);
        }
    }

    fn sweep_expired(&self) -> usize {
        let mut entries = self.write_entries();
        let removed = self.remove_expired(&mut entries, self.clock.now());
        if removed > 0 {
            info!(
                removed,
                remaining = entries.len(),
                "Cache cleanup removed expired entries"
            );
        }
        removed
    }

    fn stop_sweeper(&self) {
        self.shutdown.cancel();
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(handle);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// In-memory response cache. Cheap to clone; clones share one store.
///
/// Dropping the last handle stops the background sweeper.
#[derive(Clone)]
pub struct CacheManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("enabled", &self.shared.enabled)
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .field("max_entries", &self.shared.max_entries)
            .field("ttl", &self.shared.ttl)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Build a manager with SHA-256 keys and the system clock.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_dependencies(config, Arc::new(Sha256Hasher), Arc::new(SystemClock))
    }

    /// Build a manager with an explicit key hasher and clock.
    ///
    /// An enabled manager must be constructed inside a Tokio runtime; it
    /// spawns exactly one sweeper task there.
    pub fn with_dependencies(
        config: CacheConfig,
        hasher: Arc<dyn ContentHasher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.enabled {
            config.validate()?;
        }
        let shared = Arc::new(Shared {
            enabled: config.enabled,
            max_entries: config.max_entries,
            ttl: config.ttl(),
            closed: AtomicBool::new(false),
            entries: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            hasher,
            clock,
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        });

        if config.enabled {
            let handle = spawn_sweeper(&shared, config.cleanup_interval())?;
            *shared.sweeper.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
            info!(
                max_entries = config.max_entries,
                ttl_secs = config.ttl_secs,
                cleanup_interval_secs = config.cleanup_interval_secs,
                "Response cache enabled"
            );
        } else {
            debug!("Response cache disabled");
        }

        Ok(Self { shared })
    }

    /// Look up the cached response for `(prompt, payload)`.
    pub fn lookup(&self, prompt: &str, payload: Option<&[u8]>) -> LookupOutcome {
        if !self.shared.is_active() {
            return LookupOutcome::Disabled;
        }
        let key = CacheKey::derive(self.shared.hasher.as_ref(), prompt, payload);
        let fingerprint = payload.map(Fingerprint::of);

        match self.shared.classify(&key, fingerprint.as_ref()) {
            Some(outcome) => outcome,
            None => self.shared.resolve(&key, fingerprint.as_ref()),
        }
    }

    /// Cache `value` for `(prompt, payload)`, replacing any existing entry.
    ///
    /// Succeeds without storing when the cache is disabled or closed. Fails
    /// with [`CacheError::CapacityExhausted`] when neither the expired sweep
    /// nor one LRU eviction frees room; callers should carry on uncached.
    pub fn store(
        &self,
        prompt: &str,
        payload: Option<&[u8]>,
        value: impl Into<String>,
    ) -> Result<()> {
        if !self.shared.is_active() {
            return Ok(());
        }
        let shared = &self.shared;
        let key = CacheKey::derive(shared.hasher.as_ref(), prompt, payload);
        let fingerprint = payload.map(Fingerprint::of);
        let value = value.into();

        let mut entries = shared.write_entries();
        if shared.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let now = shared.clock.now();

        if entries.len() >= shared.max_entries {
            let swept = shared.remove_expired(&mut entries, now);
            if swept > 0 {
                debug!(removed = swept, "Swept expired entries before insert");
            }
            if entries.len() >= shared.max_entries {
                shared.evict_lru(&mut entries);
            }
            if entries.len() >= shared.max_entries {
                shared.counters.record_error();
                warn!(
                    key = %key.short(),
                    max_entries = shared.max_entries,
                    "Cache capacity exhausted, response not cached"
                );
                return Err(CacheError::CapacityExhausted {
                    max_entries: shared.max_entries,
                });
            }
        }

        debug!(key = %key.short(), "Caching response");
        entries.insert(key, CacheEntry::new(value, fingerprint, now, shared.ttl));
        Ok(())
    }

    /// Snapshot of size, capacity and lifetime counters.
    pub fn stats(&self) -> CacheStats {
        self.shared.counters.snapshot(
            self.shared.is_active(),
            self.len(),
            self.shared.max_entries,
        )
    }

    /// Run one expired-entry sweep now. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        if !self.shared.is_active() {
            return 0;
        }
        self.shared.sweep_expired()
    }

    /// Stop the sweeper and discard all entries. Counters are kept as a
    /// final snapshot. Later lookups and stores behave as if disabled.
    /// Calling this more than once is a no-op.
    pub fn close(&self) {
        if !self.shared.enabled || self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.stop_sweeper();
        let discarded = {
            let mut entries = self.shared.write_entries();
            let n = entries.len();
            entries.clear();
            n
        };
        info!(discarded, "Response cache closed");
        self.stats().emit("close");
    }

    /// Whether lookups and stores are live (enabled and not closed).
    pub fn is_enabled(&self) -> bool {
        self.shared.is_active()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.shared.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn spawn_sweeper(shared: &Arc<Shared>, interval: Duration) -> Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let shutdown = shared.shutdown.clone();

    Ok(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Cache sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }
            let Some(shared) = weak.upgrade() else {
                return;
            };
            shared.sweep_expired();
        }
    }))
}
