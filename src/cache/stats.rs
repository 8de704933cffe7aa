//! Cache Statistics Module
//!
//! Tracks lookups, evictions and single-flight activity.

use serde::Serialize;

// == Cache Stats ==
/// Cache performance counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups served from a live entry
    pub hits: u64,
    /// Lookups that found nothing live (absent or expired)
    pub misses: u64,
    /// Entries found expired at read time and dropped
    pub expirations: u64,
    /// Entries evicted to respect capacity
    pub evictions: u64,
    /// Explicit deletes that removed an entry or detached a computation
    pub invalidations: u64,
    /// Computations started by `get_or_compute`
    pub computations: u64,
    /// Callers that waited on another caller's computation
    pub coalesced: u64,
    /// Current number of entries
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
