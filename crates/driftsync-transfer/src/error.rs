//! Transfer error types

use driftsync_core::domain::{DomainError, TransportError};
use driftsync_index::IndexError;
use thiserror::Error;

/// Errors surfaced while scheduling or executing transfers
#[derive(Debug, Error)]
pub enum TransferError {
    /// The operation was cancelled cooperatively; the session was
    /// checkpointed before release and can be resumed
    #[error("Transfer cancelled")]
    Cancelled,

    /// The peer declined the offered content
    #[error("Peer declined the transfer")]
    PeerDeclined,

    /// The operation references an item the index no longer tracks
    #[error("Item missing for operation: {0}")]
    ItemMissing(String),

    /// The item has no remote identity yet the operation needs one
    #[error("Item has no remote identity: {0}")]
    MissingRemoteIdentity(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl TransferError {
    /// The transport failure underneath, if this wraps one
    ///
    /// The retry engine classifies transport variants; other transfer errors
    /// are structural.
    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            TransferError::Transport(e) => Some(e),
            _ => None,
        }
    }
}
