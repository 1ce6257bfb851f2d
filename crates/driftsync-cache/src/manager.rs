//! Offline cache manager
//!
//! Tracks every materialized local copy against the configured disk budget
//! and reclaims space by scored eviction. Eviction removes only the local
//! copy; the authoritative cloud copy is untouched and the item's
//! offline-availability flag is cleared in the index.
//!
//! The usage counter is guarded by one lock and updated in the same
//! critical section as the registry, so concurrent registrations and
//! evictions never double-count.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driftsync_core::config::CacheConfig;
use driftsync_core::domain::{CachePriority, ItemId, OfflineCacheItem, SyncEvent};
use driftsync_index::SyncIndex;

use crate::error::CacheError;
use crate::usage::CacheUsage;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Bounds disk usage of offline copies via scored eviction
pub struct CacheManager {
    index: Arc<SyncIndex>,
    registry: DashMap<ItemId, OfflineCacheItem>,
    /// Bytes currently materialized; same lock covers compound
    /// registry-plus-counter updates
    used_bytes: Mutex<u64>,
    quota_bytes: u64,
    high_water_bytes: u64,
    sweep_interval: Duration,
}

impl CacheManager {
    pub fn new(index: Arc<SyncIndex>, config: &CacheConfig) -> Self {
        let quota_bytes = config.max_size_gb * BYTES_PER_GB;
        let high_water_bytes = quota_bytes * u64::from(config.eviction_threshold_percent) / 100;
        Self {
            index,
            registry: DashMap::new(),
            used_bytes: Mutex::new(0),
            quota_bytes,
            high_water_bytes,
            sweep_interval: Duration::from_secs(u64::from(config.sweep_interval_minutes) * 60),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers a materialized copy, or refreshes size for one already held
    ///
    /// Re-registering the same item is idempotent on usage: the old size is
    /// released before the new one is charged.
    pub fn register(
        &self,
        item_id: ItemId,
        size_bytes: u64,
        priority: CachePriority,
    ) -> Result<(), CacheError> {
        {
            let mut used = self.used_bytes.lock().unwrap();
            if let Some(previous) = self
                .registry
                .insert(item_id, OfflineCacheItem::new(item_id, size_bytes, priority))
            {
                *used = used.saturating_sub(previous.size_bytes());
            }
            *used += size_bytes;
        }
        self.index.update(&item_id, |it| {
            it.set_offline_available(true);
            Ok(())
        })?;
        self.index.publish(SyncEvent::CacheUpdate {
            item_id,
            offline_available: true,
            at: Utc::now(),
        });
        debug!(item_id = %item_id, size_bytes, ?priority, "cached copy registered");
        Ok(())
    }

    /// Drops a copy from the registry without touching the index flag
    /// (the local file is already gone, e.g. after a local delete)
    pub fn forget(&self, item_id: &ItemId) {
        let mut used = self.used_bytes.lock().unwrap();
        if let Some((_, entry)) = self.registry.remove(item_id) {
            *used = used.saturating_sub(entry.size_bytes());
        }
    }

    /// Records an access, refreshing the item's recency
    pub fn touch(&self, item_id: &ItemId) -> Result<(), CacheError> {
        let mut entry = self
            .registry
            .get_mut(item_id)
            .ok_or(CacheError::NotCached(*item_id))?;
        entry.touch();
        Ok(())
    }

    /// Changes an item's retention priority
    pub fn set_priority(
        &self,
        item_id: &ItemId,
        priority: CachePriority,
    ) -> Result<(), CacheError> {
        let mut entry = self
            .registry
            .get_mut(item_id)
            .ok_or(CacheError::NotCached(*item_id))?;
        entry.set_priority(priority);
        self.index.publish(SyncEvent::CacheUpdate {
            item_id: *item_id,
            offline_available: true,
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn pin(&self, item_id: &ItemId) -> Result<(), CacheError> {
        self.set_priority(item_id, CachePriority::Pinned)
    }

    pub fn is_cached(&self, item_id: &ItemId) -> bool {
        self.registry.contains_key(item_id)
    }

    // ------------------------------------------------------------------
    // Usage and eviction
    // ------------------------------------------------------------------

    pub fn usage(&self) -> CacheUsage {
        let used_bytes = *self.used_bytes.lock().unwrap();
        let pinned_count = self.registry.iter().filter(|e| e.is_pinned()).count();
        CacheUsage {
            used_bytes,
            quota_bytes: self.quota_bytes,
            high_water_bytes: self.high_water_bytes,
            item_count: self.registry.len(),
            pinned_count,
        }
    }

    /// Whether usage stands above the high-water mark
    pub fn over_high_water(&self) -> bool {
        *self.used_bytes.lock().unwrap() > self.high_water_bytes
    }

    /// Evicts highest-score-first until usage falls below the high-water
    /// mark, returning the evicted items
    ///
    /// # Errors
    /// Returns [`CacheError::QuotaExceeded`] when usage is still above the
    /// mark but only pinned items remain.
    pub fn sweep(&self) -> Result<Vec<ItemId>, CacheError> {
        let mut evicted = Vec::new();
        let now = Utc::now();

        loop {
            let victim = {
                let used = self.used_bytes.lock().unwrap();
                if *used <= self.high_water_bytes {
                    break;
                }
                self.registry
                    .iter()
                    .filter(|e| !e.is_pinned())
                    .max_by(|a, b| {
                        a.eviction_score(now)
                            .total_cmp(&b.eviction_score(now))
                    })
                    .map(|e| *e.item_id())
            };

            let Some(item_id) = victim else {
                let usage = self.usage();
                warn!(
                    used_bytes = usage.used_bytes,
                    high_water_bytes = usage.high_water_bytes,
                    "only pinned items remain above the high-water mark"
                );
                return Err(CacheError::QuotaExceeded {
                    used_bytes: usage.used_bytes,
                    high_water_bytes: usage.high_water_bytes,
                });
            };

            self.evict(&item_id)?;
            evicted.push(item_id);
        }

        if !evicted.is_empty() {
            info!(count = evicted.len(), "cache sweep evicted items");
        }
        Ok(evicted)
    }

    /// Evicts one item: drops the registry entry and clears the
    /// offline-availability flag
    fn evict(&self, item_id: &ItemId) -> Result<(), CacheError> {
        {
            let mut used = self.used_bytes.lock().unwrap();
            let Some((_, entry)) = self.registry.remove(item_id) else {
                return Err(CacheError::NotCached(*item_id));
            };
            *used = used.saturating_sub(entry.size_bytes());
        }
        self.index.update(item_id, |it| {
            it.set_offline_available(false);
            Ok(())
        })?;
        self.index.publish(SyncEvent::CacheUpdate {
            item_id: *item_id,
            offline_available: false,
            at: Utc::now(),
        });
        debug!(item_id = %item_id, "cached copy evicted");
        Ok(())
    }

    /// Background sweep loop: fires on the configured interval and whenever
    /// usage crosses the high-water mark
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.over_high_water() {
                        if let Err(err) = self.sweep() {
                            warn!(error = %err, "cache sweep incomplete");
                        }
                    }
                }
            }
        }
    }
}
