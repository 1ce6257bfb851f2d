//! Conflict detection
//!
//! Pure classification of divergence between an indexed item and an
//! incoming remote change. The reconciler calls this for every remote
//! change that lands on an item with local state; only genuine divergence
//! produces a descriptor.

use driftsync_core::domain::{
    ConflictInfo, ConflictKind, ItemKind, SyncItem, SyncState, VersionStamp,
};
use driftsync_core::ports::RemoteChange;
use tracing::debug;

pub struct ConflictDetector;

impl ConflictDetector {
    /// Classifies the divergence between `item` and `remote`, if any
    ///
    /// Returns `None` when the sides agree, when only one side changed
    /// (a plain stale-side transfer), or when the change is a deletion
    /// (deletions are the reconciler's business).
    pub fn classify(item: &SyncItem, remote: &RemoteChange) -> Option<ConflictKind> {
        if remote.is_deleted {
            return None;
        }

        let remote_kind = if remote.is_folder {
            ItemKind::Folder
        } else {
            ItemKind::File
        };
        if item.kind() != remote_kind {
            return Some(ConflictKind::TypeMismatch);
        }

        // Folders have no content to diverge on.
        if item.kind() == ItemKind::Folder {
            return None;
        }

        // Content agrees; nothing to resolve regardless of local state.
        if item.content_hash().is_some() && item.content_hash() == remote.content_hash.as_ref() {
            return None;
        }

        // Divergence requires unsynced local changes on the same item. A
        // synced or cloud-only item just has a stale side.
        match item.state() {
            SyncState::LocalOnly | SyncState::Conflict => Some(ConflictKind::Content),
            SyncState::Uploading => Some(ConflictKind::Content),
            _ => None,
        }
    }

    /// Builds the frozen descriptor for a detected conflict
    pub fn detect(item: &SyncItem, remote: &RemoteChange) -> Option<ConflictInfo> {
        let kind = Self::classify(item, remote)?;
        debug!(path = %item.local_path(), conflict = %kind, "divergence detected");
        let local = VersionStamp::new(
            item.content_hash().cloned(),
            item.size_bytes(),
            item.modified_at(),
        );
        let remote_stamp = VersionStamp::new(
            remote.content_hash.clone(),
            remote.size_bytes,
            remote.modified_at,
        );
        Some(ConflictInfo::new(kind, local, remote_stamp))
    }

    /// Whether two sibling names collide on a case-insensitive filesystem
    ///
    /// Distinct remote items whose names differ only by case cannot coexist
    /// in one local folder; the reconciler records a name conflict for the
    /// later arrival.
    pub fn names_collide(a: &str, b: &str) -> bool {
        a != b && a.eq_ignore_ascii_case(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use driftsync_core::domain::{ContentHash, LocalPath, RemoteId, RemotePath};
    use std::path::PathBuf;

    fn local_item(state_hash: &str) -> SyncItem {
        let mut item = SyncItem::new_local(
            LocalPath::new(PathBuf::from("/home/user/sync/a.txt")).unwrap(),
            RemotePath::new("/a.txt".to_string()).unwrap(),
            ItemKind::File,
            10,
        );
        item.set_content_hash(ContentHash::new(state_hash.to_string()).unwrap());
        item.set_modified_at(Utc::now());
        item
    }

    fn remote_change(hash: &str, is_folder: bool) -> RemoteChange {
        RemoteChange {
            remote_id: RemoteId::new("R1".to_string()).unwrap(),
            remote_path: RemotePath::new("/a.txt".to_string()).unwrap(),
            name: "a.txt".to_string(),
            size_bytes: 20,
            content_hash: Some(ContentHash::new(hash.to_string()).unwrap()),
            modified_at: Some(Utc::now()),
            is_deleted: false,
            is_folder,
        }
    }

    #[test]
    fn test_both_changed_different_hashes_is_content_conflict() {
        // New local item (LocalOnly) meeting a remote version with other content.
        let item = local_item("h1");
        let remote = remote_change("h2", false);
        assert_eq!(
            ConflictDetector::classify(&item, &remote),
            Some(ConflictKind::Content)
        );
        let info = ConflictDetector::detect(&item, &remote).unwrap();
        assert_eq!(info.local().size_bytes(), 10);
        assert_eq!(info.remote().size_bytes(), 20);
    }

    #[test]
    fn test_equal_hashes_never_conflict() {
        let item = local_item("h1");
        let remote = remote_change("h1", false);
        assert_eq!(ConflictDetector::classify(&item, &remote), None);
    }

    #[test]
    fn test_synced_item_is_stale_side_not_conflict() {
        let mut item = local_item("h1");
        item.transition_to(SyncState::Uploading).unwrap();
        item.transition_to(SyncState::Synced).unwrap();
        let remote = remote_change("h2", false);
        assert_eq!(ConflictDetector::classify(&item, &remote), None);
    }

    #[test]
    fn test_file_replaced_by_folder_is_type_mismatch() {
        let item = local_item("h1");
        let remote = remote_change("h2", true);
        assert_eq!(
            ConflictDetector::classify(&item, &remote),
            Some(ConflictKind::TypeMismatch)
        );
    }

    #[test]
    fn test_deletion_is_not_a_conflict() {
        let item = local_item("h1");
        let mut remote = remote_change("h2", false);
        remote.is_deleted = true;
        assert_eq!(ConflictDetector::classify(&item, &remote), None);
    }

    #[test]
    fn test_name_collision() {
        assert!(ConflictDetector::names_collide("Report.txt", "report.txt"));
        assert!(!ConflictDetector::names_collide("report.txt", "report.txt"));
        assert!(!ConflictDetector::names_collide("a.txt", "b.txt"));
    }
}
