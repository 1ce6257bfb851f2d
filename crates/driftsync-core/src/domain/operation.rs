//! Sync operations
//!
//! A [`SyncOperation`] is one unit of work produced by the reconciler and
//! consumed by the transfer scheduler. The scheduler guarantees at most one
//! operation per item is in flight at any time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::newtypes::{ItemId, LocalPath, OperationId, RemotePath};

/// Operations older than this are dropped and re-derived from current state.
const OPERATION_TTL_HOURS: i64 = 24;

/// What a queued operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Push local content to the cloud
    Upload,
    /// Pull cloud content to the local tree
    Download,
    /// Remove the local copy (remote deletion propagating inward)
    DeleteLocal,
    /// Remove the cloud copy (local deletion propagating outward)
    DeleteRemote,
    /// Relocate the item to a new parent
    Move,
    /// Change the item's name in place
    Rename,
    /// Materialize a folder that exists on only one side
    CreateFolder,
}

impl OperationKind {
    /// Whether this kind moves content bytes and therefore consumes
    /// bandwidth budget
    pub fn is_transfer(&self) -> bool {
        matches!(self, OperationKind::Upload | OperationKind::Download)
    }

    /// Metadata-only operations bypass the bandwidth governor
    pub fn is_metadata(&self) -> bool {
        !self.is_transfer()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Upload => "upload",
            OperationKind::Download => "download",
            OperationKind::DeleteLocal => "delete-local",
            OperationKind::DeleteRemote => "delete-remote",
            OperationKind::Move => "move",
            OperationKind::Rename => "rename",
            OperationKind::CreateFolder => "create-folder",
        };
        write!(f, "{}", s)
    }
}

/// A unit of sync work bound to a single item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    id: OperationId,
    item_id: ItemId,
    kind: OperationKind,
    /// Payload size for transfers, 0 for metadata operations
    size_bytes: u64,
    /// Destination for `Move`/`Rename`, unset otherwise
    target_local: Option<LocalPath>,
    target_remote: Option<RemotePath>,
    created_at: DateTime<Utc>,
    /// Completed delivery attempts so far
    attempts: u32,
    last_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl SyncOperation {
    pub fn new(item_id: ItemId, kind: OperationKind, size_bytes: u64) -> Self {
        Self {
            id: OperationId::new(),
            item_id,
            kind,
            size_bytes,
            target_local: None,
            target_remote: None,
            created_at: Utc::now(),
            attempts: 0,
            last_attempt: None,
            last_error: None,
        }
    }

    /// Creates a move or rename operation with its destination paths
    pub fn new_relocation(
        item_id: ItemId,
        kind: OperationKind,
        target_local: LocalPath,
        target_remote: RemotePath,
    ) -> Self {
        let mut op = Self::new(item_id, kind, 0);
        op.target_local = Some(target_local);
        op.target_remote = Some(target_remote);
        op
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn target_local(&self) -> Option<&LocalPath> {
        self.target_local.as_ref()
    }

    pub fn target_remote(&self) -> Option<&RemotePath> {
        self.target_remote.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Records a delivery attempt and returns the new count
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.last_attempt = Some(Utc::now());
        self.attempts
    }

    /// Records the error that ended the most recent attempt
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// True once the operation has outlived its usefulness
    ///
    /// The filesystem may have changed arbitrarily since the operation was
    /// derived; stale work is dropped and the reconciler re-derives from
    /// current state instead.
    pub fn is_expired(&self) -> bool {
        Utc::now() - self.created_at > Duration::hours(OPERATION_TTL_HOURS)
    }
}
