//! Local filesystem events
//!
//! DTOs delivered by the host's file watcher. The watcher itself is outside
//! this engine; it feeds these events into the reconciliation channel
//! already debounced.

use chrono::{DateTime, Utc};

use driftsync_core::domain::{ContentHash, LocalPath};

/// What happened to a local path
#[derive(Debug, Clone, PartialEq)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    /// Relocated to a different folder; `from` is the prior path
    Moved { from: LocalPath },
    /// New name in the same folder; `from` is the prior path
    Renamed { from: LocalPath },
}

/// One observed local change
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    pub path: LocalPath,
    pub kind: FileEventKind,
    pub timestamp: DateTime<Utc>,
    pub is_folder: bool,
    /// Size after the change (0 for folders and deletions)
    pub size_bytes: u64,
    /// Hash of the content after the change, if the watcher computed one
    pub content_hash: Option<ContentHash>,
}

impl FileEvent {
    pub fn new(path: LocalPath, kind: FileEventKind) -> Self {
        Self {
            path,
            kind,
            timestamp: Utc::now(),
            is_folder: false,
            size_bytes: 0,
            content_hash: None,
        }
    }

    pub fn with_content(mut self, size_bytes: u64, hash: ContentHash) -> Self {
        self.size_bytes = size_bytes;
        self.content_hash = Some(hash);
        self
    }

    pub fn folder(mut self) -> Self {
        self.is_folder = true;
        self
    }

    /// The path the item occupied before this event, for moves and renames
    pub fn prior_path(&self) -> Option<&LocalPath> {
        match &self.kind {
            FileEventKind::Moved { from } | FileEventKind::Renamed { from } => Some(from),
            _ => None,
        }
    }
}
