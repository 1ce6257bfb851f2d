//! Cache usage snapshot

use serde::Serialize;

/// Point-in-time view of offline cache occupancy
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheUsage {
    /// Bytes currently materialized
    pub used_bytes: u64,
    /// Configured disk budget
    pub quota_bytes: u64,
    /// Usage above this triggers an eviction sweep
    pub high_water_bytes: u64,
    /// Registered cached copies
    pub item_count: usize,
    /// Copies exempt from eviction
    pub pinned_count: usize,
}

impl CacheUsage {
    /// Usage as a percentage of the quota
    pub fn percent_used(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.quota_bytes as f64 * 100.0
    }
}
