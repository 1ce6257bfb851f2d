//! Transport ports (driven/secondary ports)
//!
//! Interfaces for moving bytes and metadata between this node, the cloud
//! provider, and direct peers. Network transport implementations live in
//! adapter crates; the engine only ever sees these traits.
//!
//! ## Design Notes
//!
//! - Methods return `Result<_, TransportError>` rather than `anyhow::Result`
//!   because the retry engine classifies failures by variant; an opaque
//!   error would erase the taxonomy.
//! - `RemoteChange` is a port-level DTO, not a domain entity; the
//!   reconciler maps it to `SyncItem` updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::TransportError;
use crate::domain::newtypes::{ContentHash, Cursor, RemoteId, RemotePath, ResumeToken, SessionId};

// ============================================================================
// Change feed DTOs
// ============================================================================

/// One page of the provider's change feed
///
/// The cursor on the final page is persisted and replayed on the next poll;
/// a page is only considered consumed once every change in it has been
/// applied to the index.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Changes in provider order
    pub changes: Vec<RemoteChange>,
    /// Cursor to request the page after this one
    pub cursor: Cursor,
    /// Whether another page should be fetched immediately
    pub has_more: bool,
}

/// A single remote change from the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChange {
    /// Provider identifier of the changed item
    pub remote_id: RemoteId,
    /// Cloud path of the item (path at deletion time for deletes)
    pub remote_path: RemotePath,
    /// Item name
    pub name: String,
    /// Size in bytes (0 for folders and deletions)
    pub size_bytes: u64,
    /// Content hash (None for folders and deletions)
    pub content_hash: Option<ContentHash>,
    /// Remote modification time
    pub modified_at: Option<DateTime<Utc>>,
    /// Whether the item was deleted since the previous cursor
    pub is_deleted: bool,
    /// Whether the item is a folder
    pub is_folder: bool,
}

// ============================================================================
// Chunked transfer DTOs
// ============================================================================

/// Outcome of pushing one chunk of a resumable upload
#[derive(Debug, Clone)]
pub enum UploadProgress {
    /// More chunks expected; carry this token into the next call and
    /// checkpoint it in the session
    InProgress { resume_token: ResumeToken },
    /// Upload complete; the provider's identity and hash of the content
    Completed {
        remote_id: RemoteId,
        content_hash: ContentHash,
    },
}

// ============================================================================
// CloudTransport trait
// ============================================================================

/// Port trait for the cloud provider backend
///
/// Implementations handle provider-specific wire formats, authentication,
/// and mapping provider failures onto [`TransportError`] variants.
#[async_trait::async_trait]
pub trait CloudTransport: Send + Sync {
    /// Fetches one page of changes after `cursor`
    ///
    /// A `None` cursor requests the full listing (initial sync).
    async fn fetch_changes(&self, cursor: Option<&Cursor>) -> Result<ChangeSet, TransportError>;

    /// Opens a resumable upload session for `total_bytes` at `path`
    async fn begin_upload(
        &self,
        path: &RemotePath,
        total_bytes: u64,
    ) -> Result<ResumeToken, TransportError>;

    /// Pushes one chunk at `offset`; the token must come from
    /// [`begin_upload`](CloudTransport::begin_upload) or the previous chunk
    ///
    /// A token the provider no longer recognizes fails with
    /// [`TransportError::StaleResumeToken`]; the caller restarts the upload
    /// from byte zero.
    async fn upload_chunk(
        &self,
        token: &ResumeToken,
        offset: u64,
        data: &[u8],
    ) -> Result<UploadProgress, TransportError>;

    /// Reads `len` bytes of content starting at `offset`
    ///
    /// Downloads resume by offset alone; no provider token is required.
    async fn download_chunk(
        &self,
        remote_id: &RemoteId,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, TransportError>;

    /// Deletes the remote item
    async fn delete(&self, remote_id: &RemoteId) -> Result<(), TransportError>;

    /// Moves or renames the remote item to `new_path`
    async fn relocate(
        &self,
        remote_id: &RemoteId,
        new_path: &RemotePath,
    ) -> Result<(), TransportError>;

    /// Creates a remote folder, returning its identity
    async fn create_folder(&self, path: &RemotePath) -> Result<RemoteId, TransportError>;
}

// ============================================================================
// PeerTransport trait
// ============================================================================

/// Port trait for direct peer-to-peer transfers
///
/// Peer transfers move content between two nodes of the same account on a
/// local network without touching cloud quota. Sessions are keyed by
/// [`SessionId`] agreed out of band during discovery.
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Offers an item to the peer; returns false if the peer declines
    /// (already has the content, out of space)
    async fn offer(
        &self,
        session: &SessionId,
        content_hash: &ContentHash,
        total_bytes: u64,
    ) -> Result<bool, TransportError>;

    /// Sends one chunk to the peer (sender role)
    async fn send_chunk(
        &self,
        session: &SessionId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Receives one chunk from the peer (receiver role)
    async fn receive_chunk(
        &self,
        session: &SessionId,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, TransportError>;

    /// Closes the session on both ends
    async fn close(&self, session: &SessionId) -> Result<(), TransportError>;
}
