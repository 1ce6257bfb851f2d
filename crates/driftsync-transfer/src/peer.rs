//! Direct peer-to-peer transfer lane
//!
//! Moves content between two nodes of the same account on a local network.
//! Peer transfers never touch cloud quota and bypass the bandwidth governor;
//! the cloud remains the source of truth for metadata, so this lane only
//! moves bytes and leaves index bookkeeping to the caller.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use driftsync_core::domain::{
    DomainError, SessionId, SyncItem, TransferSession, TransportError,
};
use driftsync_core::ports::{LocalStore, PeerTransport};

use crate::error::TransferError;
use crate::stats::TransferStatistics;
use crate::worker::CHUNK_SIZE;

/// Sender/receiver half of a peer transfer
pub struct PeerLane {
    peer: Arc<dyn PeerTransport>,
    local: Arc<dyn LocalStore>,
    stats: Arc<TransferStatistics>,
}

impl PeerLane {
    pub fn new(
        peer: Arc<dyn PeerTransport>,
        local: Arc<dyn LocalStore>,
        stats: Arc<TransferStatistics>,
    ) -> Self {
        Self { peer, local, stats }
    }

    /// Offers and sends an item's content to the peer
    ///
    /// A fresh session opens with an offer the peer may decline (it already
    /// has the content, or lacks space); a resumed session skips the offer
    /// and continues from the last checkpoint.
    pub async fn send(
        &self,
        session_id: &SessionId,
        item: &SyncItem,
        session: &mut TransferSession,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        session.resume()?;
        let total = session.total_bytes();
        let mut offset = session.transferred_bytes();

        if offset == 0 {
            let hash = item.content_hash().ok_or_else(|| {
                TransferError::Domain(DomainError::ValidationFailed(
                    "cannot offer content without a hash".to_string(),
                ))
            })?;
            if !self.peer.offer(session_id, hash, total).await? {
                info!(path = %item.local_path(), "peer declined offer");
                session.abort();
                return Err(TransferError::PeerDeclined);
            }
        }

        while offset < total {
            if cancel.is_cancelled() {
                session.suspend();
                return Err(TransferError::Cancelled);
            }
            let len = CHUNK_SIZE.min(total - offset);
            let data = self.local.read_chunk(item.local_path(), offset, len).await?;
            self.peer.send_chunk(session_id, offset, &data).await?;
            offset += data.len() as u64;
            session.checkpoint(offset, None)?;
        }

        self.peer.close(session_id).await?;
        session.complete();
        self.stats.record_peer_completed();
        info!(path = %item.local_path(), bytes = total, "peer send complete");
        Ok(())
    }

    /// Receives an item's content from the peer and verifies it
    pub async fn receive(
        &self,
        session_id: &SessionId,
        item: &SyncItem,
        session: &mut TransferSession,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        session.resume()?;
        let total = session.total_bytes();
        let mut offset = session.transferred_bytes();

        while offset < total {
            if cancel.is_cancelled() {
                session.suspend();
                return Err(TransferError::Cancelled);
            }
            let len = CHUNK_SIZE.min(total - offset);
            let data = self.peer.receive_chunk(session_id, offset, len).await?;
            self.local
                .write_chunk(item.local_path(), offset, &data)
                .await?;
            offset += data.len() as u64;
            session.checkpoint(offset, None)?;
        }

        if let Some(expected) = item.content_hash() {
            let actual = self.local.content_hash(item.local_path()).await?;
            if actual != *expected {
                warn!(path = %item.local_path(), "peer content failed verification");
                return Err(TransferError::Transport(TransportError::IntegrityMismatch {
                    expected: expected.as_str().to_string(),
                    actual: actual.as_str().to_string(),
                }));
            }
        }

        self.peer.close(session_id).await?;
        session.complete();
        self.stats.record_peer_completed();
        info!(path = %item.local_path(), bytes = total, "peer receive complete");
        Ok(())
    }
}
