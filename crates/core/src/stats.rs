//! Common usage statistics record

use serde::{Deserialize, Serialize};

/// Statistics reported by every cache component.
///
/// Compositions aggregate these by summation; the hit rate is always
/// derived, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of live entries
    pub entries: u64,
    /// Approximate payload bytes held
    pub size_bytes: u64,
    /// Successful reads
    pub hits: u64,
    /// Reads that found nothing
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`; `0.0` when no accesses have occurred.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fold another component's counters into this record.
    pub fn merge(&mut self, other: &CacheStats) {
        self.entries += other.entries;
        self.size_bytes += other.size_bytes;
        self.hits += other.hits;
        self.misses += other.misses;
    }
}
