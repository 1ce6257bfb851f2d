//! Offline cache management for DriftSync
//!
//! Bounds the disk footprint of offline-available copies. Every
//! materialized download registers here; a background sweep (and any
//! crossing of the high-water mark) evicts the worst-scoring unpinned
//! copies until usage is back under budget. Pinned items are never
//! evicted, even at the cost of reporting the quota as exceeded.

pub mod error;
pub mod manager;
pub mod usage;

pub use error::CacheError;
pub use manager::CacheManager;
pub use usage::CacheUsage;
