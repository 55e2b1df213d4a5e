//! Single-slot time-boxed cache for the batch payload.
//!
//! This is a correctness mechanism, not a performance cache: it exists so
//! that rapid re-renders within one scope reuse the already-fetched batch,
//! while a cycle change or a different scope can never serve stale data.
//! One slot, no size bound - a new `set` unconditionally evicts.

use std::time::{Duration, Instant};

use crate::model::{BatchPayload, DashboardScope};

pub const CACHE_TTL_SECS: u64 = 300;

struct CacheEntry {
    payload: BatchPayload,
    created_at: Instant,
    scope_key: String,
}

pub struct BatchCache {
    slot: Option<CacheEntry>,
    ttl: Duration,
}

impl BatchCache {
    pub fn new(ttl_secs: u64) -> Self {
        BatchCache { slot: None, ttl: Duration::from_secs(ttl_secs) }
    }

    /// Hit only when the stored scope key equals the requested one exactly
    /// and the entry is younger than the timeout. Callers pass `now` so
    /// expiry stays deterministic under test.
    pub fn get(&self, scope: &DashboardScope, now: Instant) -> Option<&BatchPayload> {
        let entry = self.slot.as_ref()?;
        if entry.scope_key != scope.scope_key() {
            return None;
        }
        if now.duration_since(entry.created_at) >= self.ttl {
            return None;
        }
        Some(&entry.payload)
    }

    pub fn set(&mut self, scope: &DashboardScope, payload: BatchPayload, now: Instant) {
        self.slot = Some(CacheEntry {
            payload,
            created_at: now,
            scope_key: scope.scope_key(),
        });
    }

    /// Invoked on every cycle change: the next `get` must miss.
    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

impl Default for BatchCache {
    fn default() -> Self {
        Self::new(CACHE_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cycle, FilterOptions};

    fn payload(marker: &str) -> BatchPayload {
        BatchPayload {
            vespa_results: vec![crate::model::Record::new(marker)],
            national_benchmark: None,
            filter_options: FilterOptions::default(),
            school_eri: None,
            national_eri: None,
        }
    }

    #[test]
    fn test_hit_within_timeout_same_scope() {
        let scope = DashboardScope::for_establishment(Cycle::One, "est1");
        let mut cache = BatchCache::new(300);
        let t0 = Instant::now();
        cache.set(&scope, payload("p1"), t0);

        let hit = cache.get(&scope, t0 + Duration::from_secs(10));
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().vespa_results[0].id, "p1");
    }

    #[test]
    fn test_different_scope_misses_even_when_fresh() {
        let scope_a = DashboardScope::for_establishment(Cycle::One, "est1");
        let scope_b = DashboardScope::for_establishment(Cycle::One, "est2");
        let mut cache = BatchCache::new(300);
        let t0 = Instant::now();
        cache.set(&scope_a, payload("p1"), t0);

        assert!(cache.get(&scope_b, t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_expiry_after_timeout() {
        let scope = DashboardScope::for_establishment(Cycle::One, "est1");
        let mut cache = BatchCache::new(300);
        let t0 = Instant::now();
        cache.set(&scope, payload("p1"), t0);

        assert!(cache.get(&scope, t0 + Duration::from_secs(299)).is_some());
        assert!(cache.get(&scope, t0 + Duration::from_secs(300)).is_none());
        assert!(cache.get(&scope, t0 + Duration::from_secs(301)).is_none());
    }

    #[test]
    fn test_cycle_change_in_scope_key_misses() {
        let scope_c1 = DashboardScope::for_establishment(Cycle::One, "est1");
        let scope_c2 = DashboardScope::for_establishment(Cycle::Two, "est1");
        let mut cache = BatchCache::new(300);
        let t0 = Instant::now();
        cache.set(&scope_c1, payload("p1"), t0);

        assert!(cache.get(&scope_c2, t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_new_set_evicts_previous_entry() {
        let scope_a = DashboardScope::for_establishment(Cycle::One, "est1");
        let scope_b = DashboardScope::for_establishment(Cycle::One, "est2");
        let mut cache = BatchCache::new(300);
        let t0 = Instant::now();
        cache.set(&scope_a, payload("p1"), t0);
        cache.set(&scope_b, payload("p2"), t0);

        assert!(cache.get(&scope_a, t0 + Duration::from_secs(1)).is_none());
        assert!(cache.get(&scope_b, t0 + Duration::from_secs(1)).is_some());
    }

    #[test]
    fn test_clear_forces_miss() {
        let scope = DashboardScope::for_establishment(Cycle::One, "est1");
        let mut cache = BatchCache::new(300);
        let t0 = Instant::now();
        cache.set(&scope, payload("p1"), t0);
        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.get(&scope, t0 + Duration::from_secs(1)).is_none());
    }
}
