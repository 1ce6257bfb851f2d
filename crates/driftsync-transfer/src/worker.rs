//! Transfer worker
//!
//! Executes one operation at a time against the cloud and local ports.
//! Content moves in fixed-size chunks; every confirmed chunk is
//! checkpointed into the session so an interruption resumes from the last
//! confirmed byte, never from zero. Metadata operations (deletes,
//! relocations, folder creation) run without a session and bypass the
//! bandwidth governor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driftsync_core::domain::{
    DomainError, ItemId, SyncItem, SyncOperation, SyncState, TransferDirection, TransferSession,
    TransportError,
};
use driftsync_core::ports::{CloudTransport, LocalStore, UploadProgress};
use driftsync_index::SyncIndex;

use crate::error::TransferError;
use crate::governor::BandwidthGovernor;
use crate::stats::TransferStatistics;

/// Chunk size for uploads and downloads
///
/// Providers commonly require upload fragments in multiples of 320 KiB.
pub const CHUNK_SIZE: u64 = 320 * 1024;

/// Executes operations against the cloud and local content ports
pub struct TransferWorker {
    index: Arc<SyncIndex>,
    cloud: Arc<dyn CloudTransport>,
    local: Arc<dyn LocalStore>,
    stats: Arc<TransferStatistics>,
    /// Bound on each cloud port call; zero disables it
    chunk_timeout: Duration,
}

impl TransferWorker {
    pub fn new(
        index: Arc<SyncIndex>,
        cloud: Arc<dyn CloudTransport>,
        local: Arc<dyn LocalStore>,
        stats: Arc<TransferStatistics>,
        chunk_timeout: Duration,
    ) -> Self {
        Self {
            index,
            cloud,
            local,
            stats,
            chunk_timeout,
        }
    }

    pub fn stats(&self) -> &Arc<TransferStatistics> {
        &self.stats
    }

    /// Races a cloud port call against the transfer timeout
    ///
    /// A stalled call surfaces as [`TransportError::Network`], which the
    /// retry taxonomy treats as transient, so the operation is retried
    /// instead of parking the worker forever.
    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        if self.chunk_timeout.is_zero() {
            return fut.await;
        }
        match tokio::time::timeout(self.chunk_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Network(format!(
                "transfer stalled for {}s",
                self.chunk_timeout.as_secs()
            ))),
        }
    }

    /// Runs an upload or download, checkpointing progress into `session`
    ///
    /// Cancellation suspends the session after the current chunk and returns
    /// [`TransferError::Cancelled`]; the suspended session resumes later from
    /// its last checkpoint.
    pub async fn execute_transfer(
        &self,
        op: &SyncOperation,
        session: &mut TransferSession,
        governor: &BandwidthGovernor,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let item = self.item_for(op.item_id())?;
        session.resume()?;
        match session.direction() {
            TransferDirection::Upload => self.upload(&item, session, governor, cancel).await,
            TransferDirection::Download => self.download(&item, session, governor, cancel).await,
        }
    }

    /// Runs a metadata operation: delete, move, rename, or folder creation
    pub async fn execute_metadata(&self, op: &SyncOperation) -> Result<(), TransferError> {
        use driftsync_core::domain::OperationKind::*;
        match op.kind() {
            DeleteLocal => self.delete_local(op).await,
            DeleteRemote => self.delete_remote(op).await,
            Move | Rename => self.relocate(op).await,
            CreateFolder => self.create_folder(op).await,
            Upload | Download => Err(TransferError::Domain(DomainError::ValidationFailed(
                format!("{} is not a metadata operation", op.kind()),
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Content transfers
    // ------------------------------------------------------------------

    async fn upload(
        &self,
        item: &SyncItem,
        session: &mut TransferSession,
        governor: &BandwidthGovernor,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        // A resumed session may already be mid-state from before suspension.
        if item.state() != &SyncState::Uploading {
            self.index.set_state(item.id(), SyncState::Uploading)?;
        }
        let total = session.total_bytes();
        let mut offset = session.transferred_bytes();
        let mut token = match session.resume_token() {
            Some(token) => {
                debug!(path = %item.local_path(), offset, "resuming upload from checkpoint");
                token.clone()
            }
            None => {
                self.bounded(self.cloud.begin_upload(item.remote_path(), total))
                    .await?
            }
        };

        loop {
            if cancel.is_cancelled() {
                session.suspend();
                info!(path = %item.local_path(), offset, "upload suspended");
                return Err(TransferError::Cancelled);
            }
            let len = CHUNK_SIZE.min(total.saturating_sub(offset));
            governor.acquire(TransferDirection::Upload, len).await;
            let data = self.local.read_chunk(item.local_path(), offset, len).await?;

            match self
                .bounded(self.cloud.upload_chunk(&token, offset, &data))
                .await?
            {
                UploadProgress::InProgress { resume_token } => {
                    offset += data.len() as u64;
                    token = resume_token.clone();
                    session.checkpoint(offset, Some(resume_token))?;
                }
                UploadProgress::Completed {
                    remote_id,
                    content_hash,
                } => {
                    if let Some(expected) = item.content_hash() {
                        if *expected != content_hash {
                            return Err(TransferError::Transport(
                                TransportError::IntegrityMismatch {
                                    expected: expected.as_str().to_string(),
                                    actual: content_hash.as_str().to_string(),
                                },
                            ));
                        }
                    }
                    self.index.update(item.id(), |it| {
                        it.set_remote_id(remote_id.clone());
                        if it.content_hash().is_none() {
                            it.set_content_hash(content_hash.clone());
                        }
                        Ok(())
                    })?;
                    self.index.set_state(item.id(), SyncState::Synced)?;
                    session.complete();
                    self.stats.record_completed(TransferDirection::Upload, total);
                    info!(path = %item.local_path(), bytes = total, "upload complete");
                    return Ok(());
                }
            }
        }
    }

    async fn download(
        &self,
        item: &SyncItem,
        session: &mut TransferSession,
        governor: &BandwidthGovernor,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let remote_id = item
            .remote_id()
            .cloned()
            .ok_or_else(|| TransferError::MissingRemoteIdentity(item.local_path().to_string()))?;
        if item.state() != &SyncState::Downloading {
            self.index.set_state(item.id(), SyncState::Downloading)?;
        }
        let total = session.total_bytes();
        let mut offset = session.transferred_bytes();
        if offset > 0 {
            debug!(path = %item.local_path(), offset, "resuming download from checkpoint");
        }

        while offset < total {
            if cancel.is_cancelled() {
                session.suspend();
                info!(path = %item.local_path(), offset, "download suspended");
                return Err(TransferError::Cancelled);
            }
            let len = CHUNK_SIZE.min(total - offset);
            governor.acquire(TransferDirection::Download, len).await;
            let data = self
                .bounded(self.cloud.download_chunk(&remote_id, offset, len))
                .await?;
            self.local
                .write_chunk(item.local_path(), offset, &data)
                .await?;
            offset += data.len() as u64;
            session.checkpoint(offset, None)?;
        }

        if let Some(expected) = item.content_hash() {
            let actual = self.local.content_hash(item.local_path()).await?;
            if actual != *expected {
                warn!(path = %item.local_path(), "downloaded content failed verification");
                return Err(TransferError::Transport(TransportError::IntegrityMismatch {
                    expected: expected.as_str().to_string(),
                    actual: actual.as_str().to_string(),
                }));
            }
        }

        self.index.update(item.id(), |it| {
            it.set_offline_available(true);
            Ok(())
        })?;
        self.index.set_state(item.id(), SyncState::Synced)?;
        session.complete();
        self.stats
            .record_completed(TransferDirection::Download, total);
        info!(path = %item.local_path(), bytes = total, "download complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Metadata operations
    // ------------------------------------------------------------------

    async fn delete_local(&self, op: &SyncOperation) -> Result<(), TransferError> {
        let item = self.item_for(op.item_id())?;
        self.local.remove(item.local_path()).await?;
        self.index.tombstone(item.id())?;
        info!(path = %item.local_path(), "removed local copy");
        Ok(())
    }

    async fn delete_remote(&self, op: &SyncOperation) -> Result<(), TransferError> {
        let item = self.item_for(op.item_id())?;
        // Never uploaded: nothing to remove remotely.
        if let Some(remote_id) = item.remote_id() {
            self.bounded(self.cloud.delete(remote_id)).await?;
        }
        self.index.tombstone(item.id())?;
        info!(path = %item.remote_path(), "removed remote copy");
        Ok(())
    }

    /// Propagates a move or rename in whichever direction it originated
    ///
    /// A local-origin relocation has already re-keyed the index, so the
    /// item's local path matches the target and only the cloud needs the
    /// move. A remote-origin relocation still carries the old paths in the
    /// index; the local file moves first, then the index is re-keyed.
    async fn relocate(&self, op: &SyncOperation) -> Result<(), TransferError> {
        let item = self.item_for(op.item_id())?;
        let (target_local, target_remote) = match (op.target_local(), op.target_remote()) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(TransferError::Domain(DomainError::ValidationFailed(
                    "relocation without destination paths".to_string(),
                )))
            }
        };

        if item.local_path() == target_local {
            let remote_id = item.remote_id().ok_or_else(|| {
                TransferError::MissingRemoteIdentity(item.local_path().to_string())
            })?;
            self.bounded(self.cloud.relocate(remote_id, target_remote))
                .await?;
            info!(path = %target_remote, kind = %op.kind(), "relocated remote copy");
        } else {
            self.local.relocate(item.local_path(), target_local).await?;
            self.index
                .relocate(item.id(), target_local.clone(), target_remote.clone())?;
            info!(path = %target_local, kind = %op.kind(), "relocated local copy");
        }
        Ok(())
    }

    /// Materializes a folder on whichever side is missing it
    async fn create_folder(&self, op: &SyncOperation) -> Result<(), TransferError> {
        let item = self.item_for(op.item_id())?;
        match item.remote_id() {
            // Remote-origin folder: create it locally.
            Some(_) => {
                self.index.set_state(item.id(), SyncState::Downloading)?;
                self.local.create_folder(item.local_path()).await?;
            }
            // Local-origin folder: create it in the cloud and pair identity.
            None => {
                self.index.set_state(item.id(), SyncState::Uploading)?;
                let remote_id = self.bounded(self.cloud.create_folder(item.remote_path())).await?;
                self.index.update(item.id(), |it| {
                    it.set_remote_id(remote_id.clone());
                    Ok(())
                })?;
            }
        }
        self.index.set_state(item.id(), SyncState::Synced)?;
        info!(path = %item.local_path(), "folder materialized");
        Ok(())
    }

    fn item_for(&self, item_id: &ItemId) -> Result<SyncItem, TransferError> {
        self.index
            .get(item_id)
            .ok_or_else(|| TransferError::ItemMissing(item_id.to_string()))
    }
}
