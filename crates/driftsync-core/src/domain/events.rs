//! Event stream payloads
//!
//! Components publish [`SyncEvent`] values on a `tokio::sync::broadcast`
//! channel. The host application subscribes to drive UI badges and
//! notifications; slow subscribers may observe lag, never block the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conflict::{ConflictKind, ResolutionStrategy};
use super::item::SyncState;
use super::newtypes::{ItemId, LocalPath};
use super::operation::OperationKind;

/// An observable state change somewhere in the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// An item moved between sync states
    StatusChange {
        item_id: ItemId,
        path: LocalPath,
        previous: SyncState,
        current: SyncState,
        at: DateTime<Utc>,
    },
    /// An item entered or left the offline cache, or changed priority
    CacheUpdate {
        item_id: ItemId,
        offline_available: bool,
        at: DateTime<Utc>,
    },
    /// The selective sync set changed for a subtree
    SelectionChange {
        path: LocalPath,
        selected: bool,
        at: DateTime<Utc>,
    },
    /// Both sides diverged and a conflict descriptor was recorded
    ConflictDetected {
        item_id: ItemId,
        path: LocalPath,
        kind: ConflictKind,
        at: DateTime<Utc>,
    },
    /// A conflict was resolved with the given strategy
    ConflictResolved {
        item_id: ItemId,
        path: LocalPath,
        strategy: ResolutionStrategy,
        at: DateTime<Utc>,
    },
    /// An operation exhausted its retries
    OperationFailed {
        item_id: ItemId,
        kind: OperationKind,
        retry_count: u32,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// The item this event concerns, if any
    pub fn item_id(&self) -> Option<&ItemId> {
        match self {
            SyncEvent::StatusChange { item_id, .. }
            | SyncEvent::CacheUpdate { item_id, .. }
            | SyncEvent::ConflictDetected { item_id, .. }
            | SyncEvent::ConflictResolved { item_id, .. }
            | SyncEvent::OperationFailed { item_id, .. } => Some(item_id),
            SyncEvent::SelectionChange { .. } => None,
        }
    }

    /// Events the host should surface to the user immediately
    pub fn is_attention_worthy(&self) -> bool {
        matches!(
            self,
            SyncEvent::ConflictDetected { .. } | SyncEvent::OperationFailed { .. }
        )
    }
}
