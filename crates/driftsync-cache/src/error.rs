//! Cache error types

use driftsync_core::domain::ItemId;
use driftsync_index::IndexError;
use thiserror::Error;

/// Errors surfaced by the offline cache manager
#[derive(Debug, Error)]
pub enum CacheError {
    /// Usage stands above the high-water mark but only pinned items remain;
    /// the pin guarantee is never violated to reclaim space
    #[error("Cache quota exceeded: {used_bytes} bytes in use, high-water mark {high_water_bytes}")]
    QuotaExceeded {
        used_bytes: u64,
        high_water_bytes: u64,
    },

    /// The item is not registered in the cache
    #[error("Item not cached: {0}")]
    NotCached(ItemId),

    #[error(transparent)]
    Index(#[from] IndexError),
}
