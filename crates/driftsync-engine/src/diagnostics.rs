//! Engine health snapshots
//!
//! A [`DiagnosticReport`] is a point-in-time aggregate of every component's
//! counters, built on demand for status surfaces. It holds copies, never
//! references into live state.

use std::fmt;

use chrono::{DateTime, Utc};

use driftsync_cache::CacheUsage;
use driftsync_index::StatusStatistics;
use driftsync_retry::EngineState;
use driftsync_transfer::TransferStatsSnapshot;

/// Coarse health classification derived from component state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemHealthStatus {
    /// Running with nothing demanding attention
    Healthy,
    /// Running, but some items are in error or conflict, or permanent
    /// failures await review
    Degraded,
    /// The global pause machine has suspended all transfers
    Paused,
    /// Shutdown is underway
    Stopped,
}

impl fmt::Display for SystemHealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemHealthStatus::Healthy => "healthy",
            SystemHealthStatus::Degraded => "degraded",
            SystemHealthStatus::Paused => "paused",
            SystemHealthStatus::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Aggregated component counters at one instant
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Utc>,
    pub engine_state: EngineState,
    pub items: StatusStatistics,
    pub transfers: TransferStatsSnapshot,
    pub cache: CacheUsage,
    /// Permanent failures not yet marked resolved
    pub unresolved_failures: usize,
    pub health: SystemHealthStatus,
}

impl DiagnosticReport {
    /// Derives the health classification for a component snapshot
    pub fn health_of(
        state: &EngineState,
        items: &StatusStatistics,
        unresolved_failures: usize,
    ) -> SystemHealthStatus {
        match state {
            EngineState::Stopping => SystemHealthStatus::Stopped,
            EngineState::Paused(_) => SystemHealthStatus::Paused,
            EngineState::Running => {
                if items.attention() > 0 || unresolved_failures > 0 {
                    SystemHealthStatus::Degraded
                } else {
                    SystemHealthStatus::Healthy
                }
            }
        }
    }
}
