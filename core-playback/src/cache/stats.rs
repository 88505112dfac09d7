//! Cache statistics

use serde::{Deserialize, Serialize};

/// Snapshot of the segment cache occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Bytes held by committed spans
    pub total_bytes: u64,

    /// Number of keys with at least one span
    pub entries: usize,

    /// Number of committed span files
    pub spans: usize,

    /// Configured budget
    pub max_bytes: u64,

    /// Timestamp when stats were calculated
    pub calculated_at: i64,
}

impl CacheStats {
    /// Calculate cache usage as a percentage of the budget.
    pub fn usage_percentage(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.max_bytes as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    /// Bytes that can still be written before eviction kicks in.
    pub fn headroom(&self) -> u64 {
        self.max_bytes.saturating_sub(self.total_bytes)
    }
}
