//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and expirations.

use std::sync::atomic::{AtomicU64, Ordering};

// == Cache Stats ==
/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Counters ==
/// Live counters, updated without holding the store's write lock.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, total_entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            total_entries,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_starts_at_zero() {
        let counters = StatsCounters::default();
        assert_eq!(counters.snapshot(0), CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counters = StatsCounters::default();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        assert_eq!(counters.snapshot(0).hit_rate(), 0.75);
    }

    #[test]
    fn test_record_expirations() {
        let counters = StatsCounters::default();
        counters.record_expirations(2);
        counters.record_expirations(3);

        let stats = counters.snapshot(7);
        assert_eq!(stats.expirations, 5);
        assert_eq!(stats.total_entries, 7);
    }
}
