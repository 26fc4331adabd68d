//! Cache Statistics Module
//!
//! Tracks cache usage including hits, misses, and evictions by cause.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache usage metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful lookups
    pub hits: u64,
    /// Number of lookups for absent keys
    pub misses: u64,
    /// Entries evicted because they exceeded `max_entries`
    pub capacity_evictions: u64,
    /// Entries evicted because their usage expired
    pub expiration_evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total evictions regardless of cause.
    pub fn evictions(&self) -> u64 {
        self.capacity_evictions + self.expiration_evictions
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_capacity_eviction(&mut self) {
        self.capacity_evictions += 1;
    }

    pub(crate) fn record_expiration_eviction(&mut self) {
        self.expiration_evictions += 1;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions(), 0);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_evictions_sum_both_causes() {
        let mut stats = CacheStats::new();
        stats.record_capacity_eviction();
        stats.record_expiration_eviction();
        stats.record_expiration_eviction();
        assert_eq!(stats.capacity_evictions, 1);
        assert_eq!(stats.expiration_evictions, 2);
        assert_eq!(stats.evictions(), 3);
    }
}
