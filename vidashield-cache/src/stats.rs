//! Cache usage counters.

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from a fresh entry.
    pub hits: u64,
    /// Requests that started a loader.
    pub misses: u64,
    /// Requests that joined an existing flight.
    pub coalesced: u64,
    /// Flights settled by substituting a placeholder.
    pub fallbacks: u64,
    /// Flights that settled with an error.
    pub failures: u64,
    /// Number of entries currently stored, fresh or stale.
    pub entry_count: u64,
    /// Number of flights currently running.
    pub in_flight: u64,
}

impl CacheStats {
    /// Share of requests that did not start a loader (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.coalesced;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 60,
            coalesced: 20,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
