//! SyncItem domain entity
//!
//! A [`SyncItem`] is the canonical record of a file or folder tracked by the
//! engine. Exactly one item exists per (local path, remote identity) pair;
//! the index enforces that invariant at upsert time.
//!
//! ## State machine
//!
//! ```text
//!   LocalOnly ──start──► Uploading ───complete──► Synced
//!   CloudOnly ──start──► Downloading ─complete──► Synced
//!      Synced ──local/remote change──► LocalOnly | CloudOnly
//!      both changed, hashes differ ──► Conflict ──resolve──► transfer states
//!   any active state ──failure──► Error ──retry──► any
//!   any state ──global pause──► Paused ──resume──► prior work state
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::conflict::ConflictInfo;
use super::errors::DomainError;
use super::newtypes::{ContentHash, ItemId, LocalPath, RemoteId, RemotePath};

/// Whether a tracked item is a file or a folder
///
/// The variant set is closed and exhaustively matched; folders carry no
/// content hash and a size of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Folder,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::File => write!(f, "file"),
            ItemKind::Folder => write!(f, "folder"),
        }
    }
}

/// Reconciliation state of a sync item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local and remote agree on content
    #[default]
    Synced,
    /// Local content is being pushed to the cloud
    Uploading,
    /// Cloud content is being pulled to the local tree
    Downloading,
    /// Local side has content the cloud does not
    LocalOnly,
    /// Cloud side has content the local tree does not
    CloudOnly,
    /// Sides diverged irreconcilably; awaiting resolution
    Conflict,
    /// Last operation failed with a reason
    Error(String),
    /// Sync suspended by the global pause machine
    Paused,
}

impl SyncState {
    /// Returns true if a transfer is in flight for this item
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncState::Uploading | SyncState::Downloading)
    }

    /// Returns true if the item has work pending
    pub fn needs_sync(&self) -> bool {
        matches!(
            self,
            SyncState::LocalOnly | SyncState::CloudOnly | SyncState::Conflict
        )
    }

    /// Returns true if the item needs user attention
    pub fn needs_attention(&self) -> bool {
        matches!(self, SyncState::Conflict | SyncState::Error(_))
    }

    /// State name without error details
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::Synced => "Synced",
            SyncState::Uploading => "Uploading",
            SyncState::Downloading => "Downloading",
            SyncState::LocalOnly => "LocalOnly",
            SyncState::CloudOnly => "CloudOnly",
            SyncState::Conflict => "Conflict",
            SyncState::Error(_) => "Error",
            SyncState::Paused => "Paused",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Error(reason) => write!(f, "error: {}", reason),
            other => write!(f, "{}", other.name().to_lowercase()),
        }
    }
}

/// Canonical record of a tracked file or folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Engine-internal identifier
    id: ItemId,
    /// Local filesystem path (half of the identity pair)
    local_path: LocalPath,
    /// Remote identity (None for new local items not yet uploaded)
    remote_id: Option<RemoteId>,
    /// Cloud-side path
    remote_path: RemotePath,
    /// Display name (final path component)
    name: String,
    /// File or folder
    kind: ItemKind,
    /// Size in bytes (0 for folders)
    size_bytes: u64,
    /// Last observed modification time
    modified_at: Option<DateTime<Utc>>,
    /// Content hash (None for folders or unhashed items)
    content_hash: Option<ContentHash>,
    /// Parent folder by identity, never a pointer, to avoid cycles
    parent: Option<ItemId>,
    /// Current reconciliation state
    state: SyncState,
    /// Whether the item falls inside the selective sync set
    selected: bool,
    /// Whether an offline copy is materialized in the cache
    offline_available: bool,
    /// When the item last reached `Synced`
    last_synced: Option<DateTime<Utc>>,
    /// Conflict descriptor, present only while state is `Conflict`
    conflict: Option<ConflictInfo>,
    /// Set when both sides reported deletion and pending work drained
    tombstoned: bool,
}

impl SyncItem {
    /// Creates a new item first observed on the local side
    pub fn new_local(
        local_path: LocalPath,
        remote_path: RemotePath,
        kind: ItemKind,
        size_bytes: u64,
    ) -> Self {
        let name = local_path.file_name().unwrap_or_default().to_string();
        Self {
            id: ItemId::new(),
            local_path,
            remote_id: None,
            remote_path,
            name,
            kind,
            size_bytes,
            modified_at: None,
            content_hash: None,
            parent: None,
            state: SyncState::LocalOnly,
            selected: true,
            offline_available: true,
            last_synced: None,
            conflict: None,
            tombstoned: false,
        }
    }

    /// Creates a new item first observed on the remote side
    pub fn new_remote(
        local_path: LocalPath,
        remote_path: RemotePath,
        remote_id: RemoteId,
        kind: ItemKind,
        size_bytes: u64,
        content_hash: Option<ContentHash>,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        let name = remote_path.file_name().unwrap_or_default().to_string();
        Self {
            id: ItemId::new(),
            local_path,
            remote_id: Some(remote_id),
            remote_path,
            name,
            kind,
            size_bytes,
            modified_at,
            content_hash,
            parent: None,
            state: SyncState::CloudOnly,
            selected: true,
            offline_available: false,
            last_synced: None,
            conflict: None,
            tombstoned: false,
        }
    }

    // --- Getters ---

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn local_path(&self) -> &LocalPath {
        &self.local_path
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    pub fn remote_path(&self) -> &RemotePath {
        &self.remote_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    pub fn parent(&self) -> Option<&ItemId> {
        self.parent.as_ref()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_offline_available(&self) -> bool {
        self.offline_available
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    pub fn conflict(&self) -> Option<&ConflictInfo> {
        self.conflict.as_ref()
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned
    }

    /// True iff a transfer is in flight (`Uploading` or `Downloading`)
    pub fn is_syncing(&self) -> bool {
        self.state.is_syncing()
    }

    /// True iff the item has pending work (`LocalOnly`, `CloudOnly`, `Conflict`)
    pub fn needs_sync(&self) -> bool {
        self.state.needs_sync()
    }

    // --- Setters ---

    pub fn set_remote_id(&mut self, remote_id: RemoteId) {
        self.remote_id = Some(remote_id);
    }

    /// Detaches the item from its cloud identity
    ///
    /// Used when the cloud version is handed to a different item (keep-both
    /// resolution); the next upload mints a fresh identity.
    pub fn clear_remote_id(&mut self) {
        self.remote_id = None;
    }

    pub fn set_size_bytes(&mut self, size: u64) {
        self.size_bytes = size;
    }

    pub fn set_modified_at(&mut self, when: DateTime<Utc>) {
        self.modified_at = Some(when);
    }

    pub fn set_content_hash(&mut self, hash: ContentHash) {
        self.content_hash = Some(hash);
    }

    pub fn set_parent(&mut self, parent: Option<ItemId>) {
        self.parent = parent;
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn set_offline_available(&mut self, available: bool) {
        self.offline_available = available;
    }

    /// Re-keys the item after a move or rename; identity and hash survive
    pub fn relocate(&mut self, local_path: LocalPath, remote_path: RemotePath) {
        self.name = local_path.file_name().unwrap_or_default().to_string();
        self.local_path = local_path;
        self.remote_path = remote_path;
    }

    // --- State transitions ---

    /// Checks whether a transition to `target` is permitted
    ///
    /// `Error` and `Paused` may transition anywhere (retry / resume); a
    /// tombstoned item accepts no further transitions.
    pub fn can_transition_to(&self, target: &SyncState) -> bool {
        if self.tombstoned {
            return false;
        }
        if matches!(self.state, SyncState::Error(_) | SyncState::Paused) {
            return true;
        }
        // Global pause may interrupt anything.
        if matches!(target, SyncState::Paused | SyncState::Error(_)) {
            return true;
        }

        match (&self.state, target) {
            (SyncState::Synced, SyncState::LocalOnly)
            | (SyncState::Synced, SyncState::CloudOnly)
            | (SyncState::Synced, SyncState::Conflict) => true,

            (SyncState::LocalOnly, SyncState::Uploading)
            | (SyncState::LocalOnly, SyncState::Conflict) => true,

            (SyncState::CloudOnly, SyncState::Downloading)
            | (SyncState::CloudOnly, SyncState::Conflict) => true,

            (SyncState::Uploading, SyncState::Synced)
            | (SyncState::Uploading, SyncState::Conflict) => true,

            (SyncState::Downloading, SyncState::Synced)
            | (SyncState::Downloading, SyncState::Conflict) => true,

            // Resolution decides which side (if any) still needs a transfer.
            (SyncState::Conflict, SyncState::LocalOnly)
            | (SyncState::Conflict, SyncState::CloudOnly)
            | (SyncState::Conflict, SyncState::Uploading)
            | (SyncState::Conflict, SyncState::Downloading)
            | (SyncState::Conflict, SyncState::Synced) => true,

            _ => false,
        }
    }

    /// Attempts a transition, recording side effects of entering the state
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: SyncState) -> Result<(), DomainError> {
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }

        if matches!(target, SyncState::Synced) {
            self.last_synced = Some(Utc::now());
        }
        self.state = target;
        Ok(())
    }

    /// Attaches a conflict descriptor and enters `Conflict`
    pub fn mark_conflicted(&mut self, info: ConflictInfo) -> Result<(), DomainError> {
        self.transition_to(SyncState::Conflict)?;
        self.conflict = Some(info);
        Ok(())
    }

    /// Clears the conflict descriptor after resolution
    ///
    /// Only the conflict resolver calls this; the descriptor survives failed
    /// resolution attempts so they can be retried.
    pub fn clear_conflict(&mut self) {
        self.conflict = None;
    }

    /// Marks the item as tombstoned
    ///
    /// # Errors
    /// Fails while a transfer is in flight or a conflict is unresolved;
    /// deletion during a conflict is deferred, never applied silently.
    pub fn tombstone(&mut self) -> Result<(), DomainError> {
        if self.is_syncing() {
            return Err(DomainError::ValidationFailed(
                "Cannot tombstone an item with a transfer in flight".to_string(),
            ));
        }
        if self.conflict.is_some() {
            return Err(DomainError::ValidationFailed(
                "Cannot tombstone an item with an unresolved conflict".to_string(),
            ));
        }
        self.tombstoned = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_item() -> SyncItem {
        SyncItem::new_local(
            LocalPath::new(PathBuf::from("/home/user/sync/a.txt")).unwrap(),
            RemotePath::new("/a.txt".to_string()).unwrap(),
            ItemKind::File,
            1024,
        )
    }

    mod state_predicates {
        use super::*;

        #[test]
        fn test_is_syncing() {
            assert!(SyncState::Uploading.is_syncing());
            assert!(SyncState::Downloading.is_syncing());
            assert!(!SyncState::Synced.is_syncing());
            assert!(!SyncState::Conflict.is_syncing());
        }

        #[test]
        fn test_needs_sync() {
            assert!(SyncState::LocalOnly.needs_sync());
            assert!(SyncState::CloudOnly.needs_sync());
            assert!(SyncState::Conflict.needs_sync());
            assert!(!SyncState::Synced.needs_sync());
            assert!(!SyncState::Uploading.needs_sync());
        }

        #[test]
        fn test_needs_attention() {
            assert!(SyncState::Conflict.needs_attention());
            assert!(SyncState::Error("x".to_string()).needs_attention());
            assert!(!SyncState::Paused.needs_attention());
        }

        #[test]
        fn test_display() {
            assert_eq!(SyncState::Synced.to_string(), "synced");
            assert_eq!(SyncState::Error("boom".to_string()).to_string(), "error: boom");
        }
    }

    mod construction {
        use super::*;

        #[test]
        fn test_new_local_starts_local_only() {
            let item = test_item();
            assert_eq!(item.state(), &SyncState::LocalOnly);
            assert!(item.remote_id().is_none());
            assert_eq!(item.name(), "a.txt");
            assert!(item.needs_sync());
        }

        #[test]
        fn test_new_remote_starts_cloud_only() {
            let item = SyncItem::new_remote(
                LocalPath::new(PathBuf::from("/home/user/sync/b.txt")).unwrap(),
                RemotePath::new("/b.txt".to_string()).unwrap(),
                RemoteId::new("R1".to_string()).unwrap(),
                ItemKind::File,
                2048,
                Some(ContentHash::new("h2".to_string()).unwrap()),
                Some(Utc::now()),
            );
            assert_eq!(item.state(), &SyncState::CloudOnly);
            assert!(!item.is_offline_available());
        }

        #[test]
        fn test_serde_roundtrip() {
            let item = test_item();
            let json = serde_json::to_string(&item).unwrap();
            let parsed: SyncItem = serde_json::from_str(&json).unwrap();
            assert_eq!(item, parsed);
        }
    }

    mod transitions {
        use super::*;
        use crate::domain::conflict::{ConflictInfo, ConflictKind, VersionStamp};

        fn stamp(hash: &str, size: u64) -> VersionStamp {
            VersionStamp::new(
                Some(ContentHash::new(hash.to_string()).unwrap()),
                size,
                Some(Utc::now()),
            )
        }

        #[test]
        fn test_upload_lifecycle() {
            let mut item = test_item();
            item.transition_to(SyncState::Uploading).unwrap();
            item.transition_to(SyncState::Synced).unwrap();
            assert!(item.last_synced().is_some());
        }

        #[test]
        fn test_invalid_transition_rejected() {
            let mut item = test_item();
            // LocalOnly cannot jump straight to Synced.
            let err = item.transition_to(SyncState::Synced).unwrap_err();
            assert!(matches!(err, DomainError::InvalidState { .. }));
        }

        #[test]
        fn test_error_can_transition_anywhere() {
            let mut item = test_item();
            item.transition_to(SyncState::Error("net".to_string())).unwrap();
            item.transition_to(SyncState::LocalOnly).unwrap();
            assert_eq!(item.state(), &SyncState::LocalOnly);
        }

        #[test]
        fn test_pause_interrupts_and_resumes() {
            let mut item = test_item();
            item.transition_to(SyncState::Uploading).unwrap();
            item.transition_to(SyncState::Paused).unwrap();
            item.transition_to(SyncState::LocalOnly).unwrap();
            assert!(item.needs_sync());
        }

        #[test]
        fn test_mark_conflicted_attaches_descriptor() {
            let mut item = test_item();
            let info = ConflictInfo::new(ConflictKind::Content, stamp("h1", 10), stamp("h2", 20));
            item.mark_conflicted(info).unwrap();
            assert_eq!(item.state(), &SyncState::Conflict);
            assert!(item.conflict().is_some());
        }

        #[test]
        fn test_tombstone_blocked_by_conflict() {
            let mut item = test_item();
            let info = ConflictInfo::new(ConflictKind::Content, stamp("h1", 10), stamp("h2", 20));
            item.mark_conflicted(info).unwrap();
            assert!(item.tombstone().is_err());

            item.clear_conflict();
            item.transition_to(SyncState::Synced).unwrap();
            item.tombstone().unwrap();
            assert!(item.is_tombstoned());
            assert!(!item.can_transition_to(&SyncState::LocalOnly));
        }

        #[test]
        fn test_tombstone_blocked_mid_transfer() {
            let mut item = test_item();
            item.transition_to(SyncState::Uploading).unwrap();
            assert!(item.tombstone().is_err());
        }

        #[test]
        fn test_relocate_preserves_identity_and_hash() {
            let mut item = test_item();
            item.set_content_hash(ContentHash::new("h1".to_string()).unwrap());
            let id = *item.id();

            item.relocate(
                LocalPath::new(PathBuf::from("/home/user/sync/renamed.txt")).unwrap(),
                RemotePath::new("/renamed.txt".to_string()).unwrap(),
            );

            assert_eq!(item.id(), &id);
            assert_eq!(item.name(), "renamed.txt");
            assert_eq!(item.content_hash().unwrap().as_str(), "h1");
        }
    }
}
