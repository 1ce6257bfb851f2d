//! The change reconciler
//!
//! Translates local file events and remote change pages into index
//! mutations plus the operations the scheduler should run. All methods are
//! called from one task; per-item mutations therefore never race.
//!
//! Decision table for an event landing on an item:
//! - local only, no remote record: `LocalOnly`, upload
//! - remote only, no local record: `CloudOnly`, download (if selected)
//! - both sides changed, hashes differ: conflict, no operation
//! - one side changed: transfer toward the stale side
//! - deletion on one side: propagate, unless a conflict is unresolved, in
//!   which case the deletion is parked until resolution
//!
//! Moves and renames preserve identity and hash; no re-transfer unless the
//! content changed too.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use driftsync_core::domain::{
    ConflictInfo, ConflictKind, ItemId, ItemKind, LocalPath, OperationKind, RemotePath, SyncEvent,
    SyncItem, SyncOperation, SyncState, VersionStamp,
};
use driftsync_core::ports::{ChangeSet, RemoteChange};
use driftsync_conflict::ConflictDetector;
use driftsync_index::SyncIndex;

use crate::error::ReconcileError;
use crate::events::{FileEvent, FileEventKind};
use crate::selection::SelectiveSyncTree;

/// Event-to-operation translator
pub struct Reconciler {
    index: Arc<SyncIndex>,
    selection: SelectiveSyncTree,
    root: LocalPath,
    /// Deletions parked while the item's conflict is unresolved, keyed by
    /// item with the propagation that must run after resolution
    deferred_deletions: HashMap<ItemId, OperationKind>,
}

impl Reconciler {
    pub fn new(index: Arc<SyncIndex>, root: LocalPath) -> Self {
        Self {
            index,
            selection: SelectiveSyncTree::new(root.clone()),
            root,
            deferred_deletions: HashMap::new(),
        }
    }

    pub fn selection(&self) -> &SelectiveSyncTree {
        &self.selection
    }

    /// Changes folder selection and refreshes the flags of affected items
    ///
    /// Deselection never cancels an in-flight transfer; the item simply
    /// stops being eligible for future scheduling.
    pub fn set_selected(
        &mut self,
        path: &LocalPath,
        selected: bool,
    ) -> Result<(), ReconcileError> {
        self.selection.set_selected(path, selected)?;

        for item in self.index.query(|it| it.local_path().is_within(path)) {
            let eligible = self.selection.is_eligible(item.local_path());
            self.index.update(item.id(), |it| {
                it.set_selected(eligible);
                Ok(())
            })?;
        }
        self.index.publish(SyncEvent::SelectionChange {
            path: path.clone(),
            selected,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Deletion propagations parked behind unresolved conflicts
    pub fn deferred_deletions(&self) -> Vec<ItemId> {
        self.deferred_deletions.keys().copied().collect()
    }

    /// Releases the parked deletion for a resolved item, if any
    pub fn take_deferred_deletion(&mut self, id: &ItemId) -> Option<SyncOperation> {
        self.deferred_deletions
            .remove(id)
            .map(|kind| SyncOperation::new(*id, kind, 0))
    }

    // ------------------------------------------------------------------
    // Local events
    // ------------------------------------------------------------------

    pub fn apply_local_event(
        &mut self,
        event: &FileEvent,
    ) -> Result<Vec<SyncOperation>, ReconcileError> {
        match &event.kind {
            FileEventKind::Created | FileEventKind::Modified => self.local_upserted(event),
            FileEventKind::Deleted => self.local_deleted(event),
            FileEventKind::Moved { from } | FileEventKind::Renamed { from } => {
                self.local_relocated(event, from)
            }
        }
    }

    fn local_upserted(&mut self, event: &FileEvent) -> Result<Vec<SyncOperation>, ReconcileError> {
        let remote_path = self.to_remote_path(&event.path)?;
        let eligible = self.selection.is_eligible(&event.path);

        let Some(item) = self.index.get_by_path(&event.path) else {
            return self.track_new_local(event, remote_path, eligible);
        };

        // Content unchanged: nothing to derive.
        if event.content_hash.is_some() && event.content_hash.as_ref() == item.content_hash() {
            return Ok(Vec::new());
        }

        match item.state() {
            // In-flight or conflicted items keep their stamps until the
            // transfer or resolution settles; the next reconciliation pass
            // re-derives from current content.
            SyncState::Uploading | SyncState::Downloading | SyncState::Conflict => {
                debug!(path = %event.path, state = %item.state(), "local change deferred");
                Ok(Vec::new())
            }
            // Local content appeared against a pending cloud version. Equal
            // hashes were dismissed above, so this is genuine divergence;
            // the item's own fields keep describing the cloud side and the
            // descriptor freezes both versions.
            SyncState::CloudOnly => {
                let info = ConflictInfo::new(
                    ConflictKind::Content,
                    VersionStamp::new(
                        event.content_hash.clone(),
                        event.size_bytes,
                        Some(event.timestamp),
                    ),
                    VersionStamp::new(
                        item.content_hash().cloned(),
                        item.size_bytes(),
                        item.modified_at(),
                    ),
                );
                self.index.update(item.id(), |it| it.mark_conflicted(info))?;
                info!(path = %event.path, conflict = %ConflictKind::Content, "conflict detected");
                self.index.publish(SyncEvent::ConflictDetected {
                    item_id: *item.id(),
                    path: event.path.clone(),
                    kind: ConflictKind::Content,
                    at: Utc::now(),
                });
                Ok(Vec::new())
            }
            SyncState::Synced | SyncState::LocalOnly | SyncState::Error(_) | SyncState::Paused => {
                let updated = self.index.update(item.id(), |it| {
                    if let Some(hash) = event.content_hash.clone() {
                        it.set_content_hash(hash);
                    }
                    it.set_size_bytes(event.size_bytes);
                    it.set_modified_at(event.timestamp);
                    Ok(())
                })?;
                if !matches!(updated.state(), SyncState::LocalOnly) {
                    self.index.set_state(item.id(), SyncState::LocalOnly)?;
                }
                Ok(self.schedule(&updated, OperationKind::Upload, event.size_bytes, eligible))
            }
        }
    }

    fn track_new_local(
        &mut self,
        event: &FileEvent,
        remote_path: RemotePath,
        eligible: bool,
    ) -> Result<Vec<SyncOperation>, ReconcileError> {
        let kind = if event.is_folder {
            ItemKind::Folder
        } else {
            ItemKind::File
        };
        let mut item = SyncItem::new_local(event.path.clone(), remote_path, kind, event.size_bytes);
        if let Some(hash) = &event.content_hash {
            item.set_content_hash(hash.clone());
        }
        item.set_modified_at(event.timestamp);
        item.set_selected(eligible);
        let snapshot = item.clone();
        self.index.upsert(item)?;
        if !event.is_folder {
            self.selection.add_size(&event.path, event.size_bytes)?;
        }

        let op_kind = if event.is_folder {
            OperationKind::CreateFolder
        } else {
            OperationKind::Upload
        };
        Ok(self.schedule(&snapshot, op_kind, event.size_bytes, eligible))
    }

    fn local_deleted(&mut self, event: &FileEvent) -> Result<Vec<SyncOperation>, ReconcileError> {
        let Some(item) = self.index.get_by_path(&event.path) else {
            return Ok(Vec::new());
        };

        if item.conflict().is_some() {
            // Never discard the other version silently; park the
            // propagation until the conflict is resolved.
            warn!(path = %event.path, "deletion deferred behind unresolved conflict");
            self.deferred_deletions
                .insert(*item.id(), OperationKind::DeleteRemote);
            return Ok(Vec::new());
        }
        if item.is_syncing() {
            // The in-flight transfer will fail against the missing file and
            // the retry engine re-derives from there.
            return Ok(Vec::new());
        }

        if item.kind() == ItemKind::File {
            self.selection.subtract_size(&event.path, item.size_bytes())?;
        }

        if item.remote_id().is_some() {
            Ok(vec![SyncOperation::new(
                *item.id(),
                OperationKind::DeleteRemote,
                0,
            )])
        } else {
            // Never reached the cloud; both sides are now empty.
            self.index.tombstone(item.id())?;
            Ok(Vec::new())
        }
    }

    fn local_relocated(
        &mut self,
        event: &FileEvent,
        from: &LocalPath,
    ) -> Result<Vec<SyncOperation>, ReconcileError> {
        let Some(item) = self.index.get_by_path(from) else {
            // Watcher raced ahead of us; treat as a fresh creation.
            return self.local_upserted(event);
        };

        let remote_path = self.to_remote_path(&event.path)?;
        self.index
            .relocate(item.id(), event.path.clone(), remote_path.clone())?;

        let op_kind = if from.as_ref().parent() == event.path.as_ref().parent() {
            OperationKind::Rename
        } else {
            OperationKind::Move
        };
        let mut ops = vec![SyncOperation::new_relocation(
            *item.id(),
            op_kind,
            event.path.clone(),
            remote_path,
        )];

        // Identity and hash survive the move; content is only re-sent if it
        // actually changed.
        if event.content_hash.is_some() && event.content_hash.as_ref() != item.content_hash() {
            self.index.update(item.id(), |it| {
                if let Some(hash) = event.content_hash.clone() {
                    it.set_content_hash(hash);
                }
                it.set_size_bytes(event.size_bytes);
                it.set_modified_at(event.timestamp);
                Ok(())
            })?;
            if matches!(item.state(), SyncState::Synced) {
                self.index.set_state(item.id(), SyncState::LocalOnly)?;
            }
            ops.push(SyncOperation::new(
                *item.id(),
                OperationKind::Upload,
                event.size_bytes,
            ));
        }
        Ok(ops)
    }

    // ------------------------------------------------------------------
    // Remote changes
    // ------------------------------------------------------------------

    /// Applies a full change page; the caller persists `set.cursor` only
    /// after this returns successfully
    pub fn apply_change_set(
        &mut self,
        set: &ChangeSet,
    ) -> Result<Vec<SyncOperation>, ReconcileError> {
        let mut ops = Vec::new();
        for change in &set.changes {
            ops.extend(self.apply_remote_change(change)?);
        }
        Ok(ops)
    }

    pub fn apply_remote_change(
        &mut self,
        change: &RemoteChange,
    ) -> Result<Vec<SyncOperation>, ReconcileError> {
        if change.is_deleted {
            return self.remote_deleted(change);
        }

        let local_path = self.to_local_path(&change.remote_path)?;
        let existing = self
            .index
            .get_by_remote_id(&change.remote_id)
            .or_else(|| self.index.get_by_path(&local_path));

        match existing {
            None => self.track_new_remote(change, local_path),
            Some(item) => self.remote_updated(change, item, local_path),
        }
    }

    fn remote_deleted(&mut self, change: &RemoteChange) -> Result<Vec<SyncOperation>, ReconcileError> {
        let Some(item) = self.index.get_by_remote_id(&change.remote_id) else {
            return Ok(Vec::new());
        };

        if item.conflict().is_some() {
            warn!(path = %item.local_path(), "remote deletion deferred behind unresolved conflict");
            self.deferred_deletions
                .insert(*item.id(), OperationKind::DeleteLocal);
            return Ok(Vec::new());
        }

        if matches!(item.state(), SyncState::CloudOnly) {
            // No local copy exists; both sides are now empty.
            if item.kind() == ItemKind::File {
                self.selection
                    .subtract_size(item.local_path(), item.size_bytes())?;
            }
            self.index.tombstone(item.id())?;
            return Ok(Vec::new());
        }

        Ok(vec![SyncOperation::new(
            *item.id(),
            OperationKind::DeleteLocal,
            0,
        )])
    }

    fn track_new_remote(
        &mut self,
        change: &RemoteChange,
        local_path: LocalPath,
    ) -> Result<Vec<SyncOperation>, ReconcileError> {
        // Distinct remote siblings whose names clash case-insensitively
        // cannot coexist locally.
        if let Some(parent) = local_path.as_ref().parent() {
            let collision = self.index.query(|it| {
                it.local_path().as_ref().parent() == Some(parent)
                    && ConflictDetector::names_collide(it.name(), &change.name)
            });
            if let Some(sibling) = collision.first() {
                warn!(
                    name = %change.name,
                    sibling = %sibling.name(),
                    "remote name collides with tracked sibling"
                );
                return self.track_collided_remote(change, local_path, sibling);
            }
        }

        let kind = if change.is_folder {
            ItemKind::Folder
        } else {
            ItemKind::File
        };
        let eligible = self.selection.is_eligible(&local_path);
        let mut item = SyncItem::new_remote(
            local_path.clone(),
            change.remote_path.clone(),
            change.remote_id.clone(),
            kind,
            change.size_bytes,
            change.content_hash.clone(),
            change.modified_at,
        );
        item.set_selected(eligible);
        let snapshot = item.clone();
        self.index.upsert(item)?;
        if !change.is_folder {
            self.selection.add_size(&local_path, change.size_bytes)?;
        }

        let op_kind = if change.is_folder {
            OperationKind::CreateFolder
        } else {
            OperationKind::Download
        };
        Ok(self.schedule(&snapshot, op_kind, change.size_bytes, eligible))
    }

    /// Tracks a new remote item straight into a name conflict
    ///
    /// The local stamp describes the already-tracked sibling whose name the
    /// arrival collides with; resolution decides which of the two survives
    /// under the contested name.
    fn track_collided_remote(
        &mut self,
        change: &RemoteChange,
        local_path: LocalPath,
        sibling: &SyncItem,
    ) -> Result<Vec<SyncOperation>, ReconcileError> {
        let kind = if change.is_folder {
            ItemKind::Folder
        } else {
            ItemKind::File
        };
        let mut item = SyncItem::new_remote(
            local_path.clone(),
            change.remote_path.clone(),
            change.remote_id.clone(),
            kind,
            change.size_bytes,
            change.content_hash.clone(),
            change.modified_at,
        );
        let info = ConflictInfo::new(
            ConflictKind::Name,
            VersionStamp::new(
                sibling.content_hash().cloned(),
                sibling.size_bytes(),
                sibling.modified_at(),
            ),
            VersionStamp::new(
                change.content_hash.clone(),
                change.size_bytes,
                change.modified_at,
            ),
        );
        item.mark_conflicted(info)?;
        let id = *item.id();
        self.index.upsert(item)?;
        self.index.publish(SyncEvent::ConflictDetected {
            item_id: id,
            path: local_path,
            kind: ConflictKind::Name,
            at: Utc::now(),
        });
        Ok(Vec::new())
    }

    fn remote_updated(
        &mut self,
        change: &RemoteChange,
        item: SyncItem,
        local_path: LocalPath,
    ) -> Result<Vec<SyncOperation>, ReconcileError> {
        let mut ops = Vec::new();

        // Late pairing: a locally-created item just gained its cloud identity.
        if item.remote_id().is_none() {
            self.index.update(item.id(), |it| {
                it.set_remote_id(change.remote_id.clone());
                Ok(())
            })?;
        }

        // Remote move or rename: identity and hash survive, no retransfer.
        // The index is re-keyed by the worker after the local file has
        // actually moved; until then the item keeps its old paths.
        if *item.remote_path() != change.remote_path {
            ops.push(SyncOperation::new_relocation(
                *item.id(),
                OperationKind::Move,
                local_path.clone(),
                change.remote_path.clone(),
            ));
        }

        let item = self
            .index
            .get(item.id())
            .ok_or(driftsync_index::IndexError::ItemNotFound(*item.id()))?;

        // Already awaiting resolution; the descriptor keeps the stamps from
        // first detection and resolution re-reads current remote state.
        if item.conflict().is_some() {
            return Ok(ops);
        }

        if let Some(info) = ConflictDetector::detect(&item, change) {
            let kind = info.kind();
            self.index.update(item.id(), |it| it.mark_conflicted(info))?;
            info!(path = %local_path, conflict = %kind, "conflict detected");
            self.index.publish(SyncEvent::ConflictDetected {
                item_id: *item.id(),
                path: local_path,
                kind,
                at: Utc::now(),
            });
            return Ok(ops);
        }

        // Content agrees; nothing further to transfer.
        if item.content_hash().is_some() && item.content_hash() == change.content_hash.as_ref() {
            return Ok(ops);
        }

        // Only the cloud changed: the local side is stale.
        match item.state() {
            SyncState::Synced | SyncState::Error(_) | SyncState::Paused => {
                let eligible = self.selection.is_eligible(&item.local_path());
                self.index.update(item.id(), |it| {
                    if let Some(hash) = change.content_hash.clone() {
                        it.set_content_hash(hash);
                    }
                    it.set_size_bytes(change.size_bytes);
                    if let Some(at) = change.modified_at {
                        it.set_modified_at(at);
                    }
                    Ok(())
                })?;
                self.index.set_state(item.id(), SyncState::CloudOnly)?;
                ops.extend(self.schedule(
                    &item,
                    OperationKind::Download,
                    change.size_bytes,
                    eligible,
                ));
            }
            SyncState::CloudOnly => {
                // Still pending download; refresh to the newest version.
                let eligible = self.selection.is_eligible(&item.local_path());
                self.index.update(item.id(), |it| {
                    if let Some(hash) = change.content_hash.clone() {
                        it.set_content_hash(hash);
                    }
                    it.set_size_bytes(change.size_bytes);
                    if let Some(at) = change.modified_at {
                        it.set_modified_at(at);
                    }
                    Ok(())
                })?;
                ops.extend(self.schedule(
                    &item,
                    OperationKind::Download,
                    change.size_bytes,
                    eligible,
                ));
            }
            // Folders and in-flight transfers settle on their own.
            _ => {}
        }
        Ok(ops)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn schedule(
        &self,
        item: &SyncItem,
        kind: OperationKind,
        size_bytes: u64,
        eligible: bool,
    ) -> Vec<SyncOperation> {
        if !eligible {
            debug!(path = %item.local_path(), op = %kind, "outside selection, not scheduled");
            return Vec::new();
        }
        vec![SyncOperation::new(*item.id(), kind, size_bytes)]
    }

    fn to_remote_path(&self, local: &LocalPath) -> Result<RemotePath, ReconcileError> {
        if !local.is_within(&self.root) {
            return Err(ReconcileError::OutsideRoot(local.to_string()));
        }
        let relative = local
            .as_ref()
            .strip_prefix(self.root.as_ref())
            .map_err(|_| ReconcileError::OutsideRoot(local.to_string()))?;
        let mut remote = RemotePath::root();
        for component in relative.components() {
            let name = component.as_os_str().to_string_lossy();
            remote = remote.join(&name)?;
        }
        Ok(remote)
    }

    fn to_local_path(&self, remote: &RemotePath) -> Result<LocalPath, ReconcileError> {
        let mut local = self.root.clone();
        for component in remote.as_str().split('/').filter(|c| !c.is_empty()) {
            local = local.join(component)?;
        }
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_core::domain::{ContentHash, RemoteId};
    use std::path::PathBuf;

    fn root() -> LocalPath {
        LocalPath::new(PathBuf::from("/home/user/sync")).unwrap()
    }

    fn path(p: &str) -> LocalPath {
        LocalPath::new(PathBuf::from(p)).unwrap()
    }

    fn hash(h: &str) -> ContentHash {
        ContentHash::new(h.to_string()).unwrap()
    }

    fn setup() -> (Arc<SyncIndex>, Reconciler) {
        let index = Arc::new(SyncIndex::new());
        let reconciler = Reconciler::new(index.clone(), root());
        (index, reconciler)
    }

    fn created_event(p: &str, h: &str, size: u64) -> FileEvent {
        FileEvent::new(path(p), FileEventKind::Created).with_content(size, hash(h))
    }

    fn remote_change(id: &str, rpath: &str, h: &str, size: u64) -> RemoteChange {
        RemoteChange {
            remote_id: RemoteId::new(id.to_string()).unwrap(),
            remote_path: RemotePath::new(rpath.to_string()).unwrap(),
            name: rpath.rsplit('/').next().unwrap_or_default().to_string(),
            size_bytes: size,
            content_hash: Some(hash(h)),
            modified_at: Some(Utc::now()),
            is_deleted: false,
            is_folder: false,
        }
    }

    mod local_event_tests {
        use super::*;

        #[test]
        fn test_new_local_file_enqueues_upload() {
            let (index, mut rec) = setup();
            let ops = rec
                .apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();

            assert_eq!(ops.len(), 1);
            assert_eq!(ops[0].kind(), OperationKind::Upload);
            let item = index.get_by_path(&path("/home/user/sync/a.txt")).unwrap();
            assert_eq!(item.state(), &SyncState::LocalOnly);
            assert_eq!(item.remote_path().as_str(), "/a.txt");
        }

        #[test]
        fn test_new_local_folder_enqueues_create_folder() {
            let (_, mut rec) = setup();
            let event = FileEvent::new(path("/home/user/sync/docs"), FileEventKind::Created).folder();
            let ops = rec.apply_local_event(&event).unwrap();
            assert_eq!(ops[0].kind(), OperationKind::CreateFolder);
        }

        #[test]
        fn test_modify_synced_item_enqueues_upload() {
            let (index, mut rec) = setup();
            rec.apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();
            let id = *index.get_by_path(&path("/home/user/sync/a.txt")).unwrap().id();
            index.set_state(&id, SyncState::Uploading).unwrap();
            index.set_state(&id, SyncState::Synced).unwrap();

            let event = FileEvent::new(path("/home/user/sync/a.txt"), FileEventKind::Modified)
                .with_content(120, hash("h2"));
            let ops = rec.apply_local_event(&event).unwrap();

            assert_eq!(ops[0].kind(), OperationKind::Upload);
            let item = index.get(&id).unwrap();
            assert_eq!(item.state(), &SyncState::LocalOnly);
            assert_eq!(item.content_hash().unwrap().as_str(), "h2");
        }

        #[test]
        fn test_unchanged_hash_is_noop() {
            let (_, mut rec) = setup();
            rec.apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();
            let ops = rec
                .apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();
            assert!(ops.is_empty());
        }

        #[test]
        fn test_event_outside_selection_tracks_without_scheduling() {
            let (index, mut rec) = setup();
            rec.set_selected(&path("/home/user/sync/docs"), false).unwrap();

            let ops = rec
                .apply_local_event(&created_event("/home/user/sync/docs/a.txt", "h1", 10))
                .unwrap();
            assert!(ops.is_empty());
            // Metadata is retained even though nothing is scheduled.
            let item = index
                .get_by_path(&path("/home/user/sync/docs/a.txt"))
                .unwrap();
            assert!(!item.is_selected());
        }

        #[test]
        fn test_event_outside_root_fails() {
            let (_, mut rec) = setup();
            let err = rec
                .apply_local_event(&created_event("/elsewhere/a.txt", "h1", 10))
                .unwrap_err();
            assert!(matches!(err, ReconcileError::OutsideRoot(_)));
        }
    }

    mod deletion_tests {
        use super::*;

        #[test]
        fn test_local_delete_propagates_to_remote() {
            let (index, mut rec) = setup();
            rec.apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();
            let id = *index.get_by_path(&path("/home/user/sync/a.txt")).unwrap().id();
            index
                .update(&id, |it| {
                    it.set_remote_id(RemoteId::new("R1".to_string()).unwrap());
                    Ok(())
                })
                .unwrap();

            let event = FileEvent::new(path("/home/user/sync/a.txt"), FileEventKind::Deleted);
            let ops = rec.apply_local_event(&event).unwrap();
            assert_eq!(ops[0].kind(), OperationKind::DeleteRemote);
        }

        #[test]
        fn test_local_delete_of_unuploaded_item_tombstones() {
            let (index, mut rec) = setup();
            rec.apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();

            let event = FileEvent::new(path("/home/user/sync/a.txt"), FileEventKind::Deleted);
            let ops = rec.apply_local_event(&event).unwrap();
            assert!(ops.is_empty());
            assert!(index.get_by_path(&path("/home/user/sync/a.txt")).is_none());
        }

        #[test]
        fn test_delete_during_conflict_is_deferred() {
            let (index, mut rec) = setup();
            // Local create then divergent remote -> conflict.
            rec.apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();
            rec.apply_remote_change(&remote_change("R1", "/a.txt", "h2", 200))
                .unwrap();
            let id = *index.get_by_path(&path("/home/user/sync/a.txt")).unwrap().id();
            assert_eq!(index.get(&id).unwrap().state(), &SyncState::Conflict);

            let event = FileEvent::new(path("/home/user/sync/a.txt"), FileEventKind::Deleted);
            let ops = rec.apply_local_event(&event).unwrap();
            assert!(ops.is_empty());
            assert_eq!(rec.deferred_deletions(), vec![id]);

            // After resolution the parked propagation is released.
            let released = rec.take_deferred_deletion(&id).unwrap();
            assert_eq!(released.kind(), OperationKind::DeleteRemote);
            assert!(rec.take_deferred_deletion(&id).is_none());
        }

        #[test]
        fn test_remote_delete_propagates_locally() {
            let (index, mut rec) = setup();
            rec.apply_remote_change(&remote_change("R1", "/a.txt", "h1", 100))
                .unwrap();
            let id = *index.get_by_path(&path("/home/user/sync/a.txt")).unwrap().id();
            index.set_state(&id, SyncState::Downloading).unwrap();
            index.set_state(&id, SyncState::Synced).unwrap();

            let mut change = remote_change("R1", "/a.txt", "h1", 100);
            change.is_deleted = true;
            let ops = rec.apply_remote_change(&change).unwrap();
            assert_eq!(ops[0].kind(), OperationKind::DeleteLocal);
        }

        #[test]
        fn test_remote_delete_of_undownloaded_item_tombstones() {
            let (index, mut rec) = setup();
            rec.apply_remote_change(&remote_change("R1", "/a.txt", "h1", 100))
                .unwrap();

            let mut change = remote_change("R1", "/a.txt", "h1", 100);
            change.is_deleted = true;
            let ops = rec.apply_remote_change(&change).unwrap();
            assert!(ops.is_empty());
            assert!(index.get_by_path(&path("/home/user/sync/a.txt")).is_none());
        }
    }

    mod remote_change_tests {
        use super::*;

        #[test]
        fn test_new_remote_file_enqueues_download() {
            let (index, mut rec) = setup();
            let ops = rec
                .apply_remote_change(&remote_change("R1", "/docs/b.txt", "h1", 50))
                .unwrap();

            assert_eq!(ops[0].kind(), OperationKind::Download);
            let item = index
                .get_by_path(&path("/home/user/sync/docs/b.txt"))
                .unwrap();
            assert_eq!(item.state(), &SyncState::CloudOnly);
        }

        #[test]
        fn test_new_remote_outside_selection_is_placeholder() {
            let (index, mut rec) = setup();
            rec.set_selected(&path("/home/user/sync/docs"), false).unwrap();

            let ops = rec
                .apply_remote_change(&remote_change("R1", "/docs/b.txt", "h1", 50))
                .unwrap();
            assert!(ops.is_empty());
            let item = index
                .get_by_path(&path("/home/user/sync/docs/b.txt"))
                .unwrap();
            assert!(!item.is_selected());
            assert_eq!(item.state(), &SyncState::CloudOnly);
        }

        #[test]
        fn test_both_changed_yields_conflict_not_operation() {
            let (index, mut rec) = setup();
            rec.apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();
            let ops = rec
                .apply_remote_change(&remote_change("R1", "/a.txt", "h2", 200))
                .unwrap();

            assert!(ops.is_empty());
            let item = index.get_by_path(&path("/home/user/sync/a.txt")).unwrap();
            assert_eq!(item.state(), &SyncState::Conflict);
            let info = item.conflict().unwrap();
            assert_eq!(info.local().size_bytes(), 100);
            assert_eq!(info.remote().size_bytes(), 200);
            // The cloud identity paired during detection.
            assert_eq!(item.remote_id().unwrap().as_str(), "R1");
        }

        #[test]
        fn test_remote_change_on_synced_item_enqueues_download() {
            let (index, mut rec) = setup();
            rec.apply_remote_change(&remote_change("R1", "/a.txt", "h1", 100))
                .unwrap();
            let id = *index.get_by_path(&path("/home/user/sync/a.txt")).unwrap().id();
            index.set_state(&id, SyncState::Downloading).unwrap();
            index.set_state(&id, SyncState::Synced).unwrap();

            let ops = rec
                .apply_remote_change(&remote_change("R1", "/a.txt", "h2", 120))
                .unwrap();
            assert_eq!(ops[0].kind(), OperationKind::Download);
            assert_eq!(index.get(&id).unwrap().state(), &SyncState::CloudOnly);
        }

        #[test]
        fn test_remote_move_preserves_identity_without_retransfer() {
            let (index, mut rec) = setup();
            rec.apply_remote_change(&remote_change("R1", "/a.txt", "h1", 100))
                .unwrap();
            let id = *index.get_by_path(&path("/home/user/sync/a.txt")).unwrap().id();
            index.set_state(&id, SyncState::Downloading).unwrap();
            index.set_state(&id, SyncState::Synced).unwrap();

            let ops = rec
                .apply_remote_change(&remote_change("R1", "/docs/a.txt", "h1", 100))
                .unwrap();

            assert_eq!(ops.len(), 1);
            assert_eq!(ops[0].kind(), OperationKind::Move);
            assert_eq!(
                ops[0].target_local().unwrap(),
                &path("/home/user/sync/docs/a.txt")
            );
            // The index keeps the old paths until the worker has moved the
            // local file; only identity and hash matter here.
            let item = index.get(&id).unwrap();
            assert_eq!(item.local_path(), &path("/home/user/sync/a.txt"));
            assert_eq!(item.content_hash().unwrap().as_str(), "h1");
            assert_eq!(item.state(), &SyncState::Synced);
        }

        #[test]
        fn test_name_collision_records_name_conflict() {
            let (index, mut rec) = setup();
            rec.apply_remote_change(&remote_change("R1", "/Report.txt", "h1", 10))
                .unwrap();
            let ops = rec
                .apply_remote_change(&remote_change("R2", "/report.txt", "h2", 20))
                .unwrap();

            assert!(ops.is_empty());
            let item = index
                .get_by_path(&path("/home/user/sync/report.txt"))
                .unwrap();
            assert_eq!(item.state(), &SyncState::Conflict);
            assert_eq!(
                item.conflict().unwrap().kind(),
                driftsync_core::domain::ConflictKind::Name
            );
        }

        #[test]
        fn test_change_set_applies_all_pages_entries() {
            let (_, mut rec) = setup();
            let set = ChangeSet {
                changes: vec![
                    remote_change("R1", "/a.txt", "h1", 10),
                    remote_change("R2", "/b.txt", "h2", 20),
                ],
                cursor: driftsync_core::domain::Cursor::new("c1".to_string()).unwrap(),
                has_more: false,
            };
            let ops = rec.apply_change_set(&set).unwrap();
            assert_eq!(ops.len(), 2);
        }
    }

    mod relocation_tests {
        use super::*;

        #[test]
        fn test_local_rename_is_metadata_only() {
            let (index, mut rec) = setup();
            rec.apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();
            let id = *index.get_by_path(&path("/home/user/sync/a.txt")).unwrap().id();

            let event = FileEvent {
                path: path("/home/user/sync/b.txt"),
                kind: FileEventKind::Renamed {
                    from: path("/home/user/sync/a.txt"),
                },
                timestamp: Utc::now(),
                is_folder: false,
                size_bytes: 100,
                content_hash: Some(hash("h1")),
            };
            let ops = rec.apply_local_event(&event).unwrap();

            assert_eq!(ops.len(), 1);
            assert_eq!(ops[0].kind(), OperationKind::Rename);
            assert_eq!(ops[0].target_remote().unwrap().as_str(), "/b.txt");
            let item = index.get(&id).unwrap();
            assert_eq!(item.content_hash().unwrap().as_str(), "h1");
        }

        #[test]
        fn test_local_move_with_content_change_also_uploads() {
            let (index, mut rec) = setup();
            rec.apply_local_event(&created_event("/home/user/sync/a.txt", "h1", 100))
                .unwrap();
            let _ = index.get_by_path(&path("/home/user/sync/a.txt")).unwrap();

            let event = FileEvent {
                path: path("/home/user/sync/docs/a.txt"),
                kind: FileEventKind::Moved {
                    from: path("/home/user/sync/a.txt"),
                },
                timestamp: Utc::now(),
                is_folder: false,
                size_bytes: 150,
                content_hash: Some(hash("h9")),
            };
            let ops = rec.apply_local_event(&event).unwrap();
            let kinds: Vec<_> = ops.iter().map(|op| op.kind()).collect();
            assert_eq!(kinds, vec![OperationKind::Move, OperationKind::Upload]);
        }
    }

    mod selection_integration_tests {
        use super::*;

        #[test]
        fn test_deselection_updates_item_flags() {
            let (index, mut rec) = setup();
            rec.apply_remote_change(&remote_change("R1", "/docs/a.txt", "h1", 10))
                .unwrap();
            rec.set_selected(&path("/home/user/sync/docs"), false).unwrap();

            let item = index
                .get_by_path(&path("/home/user/sync/docs/a.txt"))
                .unwrap();
            assert!(!item.is_selected());

            // Further remote changes no longer schedule downloads.
            let ops = rec
                .apply_remote_change(&remote_change("R1", "/docs/a.txt", "h2", 20))
                .unwrap();
            assert!(ops.is_empty());
        }
    }
}
