//! Transfer statistics
//!
//! Lock-free counters updated by workers; snapshots are taken for the
//! diagnostics surface.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use driftsync_core::domain::TransferDirection;

/// Cumulative transfer counters
#[derive(Debug, Default)]
pub struct TransferStatistics {
    uploads_completed: AtomicU64,
    downloads_completed: AtomicU64,
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    failed_attempts: AtomicU64,
    peer_transfers_completed: AtomicU64,
}

/// Point-in-time view of the counters plus current queue depth
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransferStatsSnapshot {
    pub uploads_completed: u64,
    pub downloads_completed: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    pub failed_attempts: u64,
    pub peer_transfers_completed: u64,
    pub active_transfers: usize,
    pub queued_operations: usize,
}

impl TransferStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&self, direction: TransferDirection, bytes: u64) {
        match direction {
            TransferDirection::Upload => {
                self.uploads_completed.fetch_add(1, Ordering::Relaxed);
                self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
            }
            TransferDirection::Download => {
                self.downloads_completed.fetch_add(1, Ordering::Relaxed);
                self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
            }
        }
    }

    pub fn record_failure(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_completed(&self) {
        self.peer_transfers_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_transfers: usize, queued_operations: usize) -> TransferStatsSnapshot {
        TransferStatsSnapshot {
            uploads_completed: self.uploads_completed.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            peer_transfers_completed: self.peer_transfers_completed.load(Ordering::Relaxed),
            active_transfers,
            queued_operations,
        }
    }
}
