//! A single cached response and the predicates shared by every expiry and
//! eviction path.

use std::time::{Duration, Instant};

use super::key::Fingerprint;
use crate::config::MAX_DURATION_SECS;

/// Used when `created_at + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(MAX_DURATION_SECS);

/// A cached upstream response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached response body.
    pub value: String,
    /// Fingerprint of the binary payload stored with the prompt, if any.
    pub content_fingerprint: Option<Fingerprint>,
    pub created_at: Instant,
    /// Fixed at `created_at + ttl`; never extended on access.
    pub expires_at: Instant,
    pub last_accessed_at: Instant,
    /// Number of hits since creation.
    pub access_count: u64,
}

impl CacheEntry {
    pub fn new(
        value: String,
        content_fingerprint: Option<Fingerprint>,
        now: Instant,
        ttl: Duration,
    ) -> Self {
        Self {
            value,
            content_fingerprint,
            created_at: now,
            expires_at: expiry_for(now, ttl),
            last_accessed_at: now,
            access_count: 0,
        }
    }

    /// The expiry predicate. Inclusive: an entry is dead at exactly
    /// `expires_at`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Whether a lookup supplying `payload` may reuse this entry.
    pub fn matches_payload(&self, payload: Option<&Fingerprint>) -> bool {
        match payload {
            None => true,
            Some(fp) => self.content_fingerprint.as_ref() == Some(fp),
        }
    }

    /// Record a hit.
    pub fn touch(&mut self, now: Instant) {
        self.last_accessed_at = now;
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Eviction rank: the minimum is evicted first. Fewest hits loses,
    /// ties go to the least recently accessed.
    pub fn eviction_rank(&self) -> (u64, Instant) {
        (self.access_count, self.last_accessed_at)
    }
}

fn expiry_for(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let t0 = Instant::now();
        let ttl = Duration::from_secs(10);
        let entry = CacheEntry::new("v".into(), None, t0, ttl);
        assert_eq!(entry.expires_at, t0 + ttl);
        assert!(!entry.is_expired(t0 + ttl - Duration::from_millis(1)));
        assert!(entry.is_expired(t0 + ttl));
        assert!(entry.is_expired(t0 + ttl + Duration::from_secs(1)));
    }

    #[test]
    fn test_overflowing_ttl_caps_expiry() {
        let t0 = Instant::now();
        let entry = CacheEntry::new("v".into(), None, t0, Duration::MAX);
        assert!(entry.expires_at > t0);
        assert!(!entry.is_expired(t0 + Duration::from_secs(3600)));
    }

    #[test]
    fn test_touch_does_not_extend_expiry() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::new("v".into(), None, t0, Duration::from_secs(10));
        entry.touch(t0 + Duration::from_secs(9));
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_accessed_at, t0 + Duration::from_secs(9));
        assert_eq!(entry.expires_at, t0 + Duration::from_secs(10));
    }

    #[test]
    fn test_payload_match() {
        let t0 = Instant::now();
        let fp = Fingerprint::of(b"img");
        let entry = CacheEntry::new("v".into(), Some(fp.clone()), t0, Duration::from_secs(1));
        assert!(entry.matches_payload(None));
        assert!(entry.matches_payload(Some(&fp)));
        assert!(!entry.matches_payload(Some(&Fingerprint::of(b"other"))));

        let text_only = CacheEntry::new("v".into(), None, t0, Duration::from_secs(1));
        assert!(!text_only.matches_payload(Some(&fp)));
    }

    #[test]
    fn test_eviction_rank_prefers_cold_entries() {
        let t0 = Instant::now();
        let ttl = Duration::from_secs(60);
        let mut warm_old = CacheEntry::new("a".into(), None, t0, ttl);
        warm_old.touch(t0);
        let cold_new = CacheEntry::new("b".into(), None, t0 + Duration::from_secs(5), ttl);
        assert!(cold_new.eviction_rank() < warm_old.eviction_rank());

        let cold_old = CacheEntry::new("c".into(), None, t0, ttl);
        assert!(cold_old.eviction_rank() < cold_new.eviction_rank());
    }
}
