//! Offline cache domain types
//!
//! The cache manager in `driftsync-cache` decides which materialized local
//! copies to evict when disk budget runs out. Scoring lives here so the
//! policy stays pure and unit-testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ItemId;

/// Retention priority of a cached item
///
/// Lower rank means more valuable. `Pinned` items are never evicted
/// regardless of score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePriority {
    Pinned,
    High,
    #[default]
    Normal,
    Low,
}

impl CachePriority {
    /// Numeric rank used in the eviction score
    pub fn rank(&self) -> u8 {
        match self {
            CachePriority::Pinned => 0,
            CachePriority::High => 1,
            CachePriority::Normal => 2,
            CachePriority::Low => 3,
        }
    }
}

/// A materialized local copy tracked by the offline cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineCacheItem {
    item_id: ItemId,
    size_bytes: u64,
    priority: CachePriority,
    last_accessed: DateTime<Utc>,
}

impl OfflineCacheItem {
    pub fn new(item_id: ItemId, size_bytes: u64, priority: CachePriority) -> Self {
        Self {
            item_id,
            size_bytes,
            priority,
            last_accessed: Utc::now(),
        }
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn priority(&self) -> CachePriority {
        self.priority
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn set_priority(&mut self, priority: CachePriority) {
        self.priority = priority;
    }

    pub fn set_size_bytes(&mut self, size: u64) {
        self.size_bytes = size;
    }

    /// Records an access, refreshing recency
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    /// True iff the item must never be evicted
    pub fn is_pinned(&self) -> bool {
        self.priority == CachePriority::Pinned
    }

    /// Eviction score at `now`; higher means evicted sooner
    ///
    /// Weighted blend of staleness, size, and priority rank:
    /// `0.4 * days_since_access + 0.3 * size_mb + 0.3 * rank`.
    pub fn eviction_score(&self, now: DateTime<Utc>) -> f64 {
        let days = (now - self.last_accessed).num_seconds().max(0) as f64 / 86_400.0;
        let size_mb = self.size_bytes as f64 / (1024.0 * 1024.0);
        0.4 * days + 0.3 * size_mb + 0.3 * f64::from(self.priority.rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_priority_ranks() {
        assert_eq!(CachePriority::Pinned.rank(), 0);
        assert_eq!(CachePriority::High.rank(), 1);
        assert_eq!(CachePriority::Normal.rank(), 2);
        assert_eq!(CachePriority::Low.rank(), 3);
        assert!(CachePriority::Pinned < CachePriority::Low);
    }

    #[test]
    fn test_staler_items_score_higher() {
        let now = Utc::now();
        let mut fresh = OfflineCacheItem::new(ItemId::new(), 1024, CachePriority::Normal);
        let mut stale = fresh.clone();
        fresh.last_accessed = now;
        stale.last_accessed = now - Duration::days(30);
        assert!(stale.eviction_score(now) > fresh.eviction_score(now));
    }

    #[test]
    fn test_larger_items_score_higher() {
        let now = Utc::now();
        let small = OfflineCacheItem::new(ItemId::new(), 1024, CachePriority::Normal);
        let big = OfflineCacheItem::new(ItemId::new(), 100 * 1024 * 1024, CachePriority::Normal);
        assert!(big.eviction_score(now) > small.eviction_score(now));
    }

    #[test]
    fn test_lower_priority_scores_higher() {
        let now = Utc::now();
        let high = OfflineCacheItem::new(ItemId::new(), 1024, CachePriority::High);
        let low = OfflineCacheItem::new(ItemId::new(), 1024, CachePriority::Low);
        assert!(low.eviction_score(now) > high.eviction_score(now));
    }

    #[test]
    fn test_touch_refreshes_recency() {
        let now = Utc::now();
        let mut item = OfflineCacheItem::new(ItemId::new(), 1024, CachePriority::Normal);
        item.last_accessed = now - Duration::days(10);
        let before = item.eviction_score(now);
        item.touch();
        assert!(item.eviction_score(now) < before);
    }

    #[test]
    fn test_pinned_flag() {
        let item = OfflineCacheItem::new(ItemId::new(), 1024, CachePriority::Pinned);
        assert!(item.is_pinned());
    }
}
