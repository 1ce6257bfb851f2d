//! Engine error types

use thiserror::Error;

use driftsync_core::domain::{DomainError, TransportError};
use driftsync_core::ports::StoreError;
use driftsync_conflict::ConflictError;
use driftsync_index::IndexError;
use driftsync_reconcile::ReconcileError;

/// Errors surfaced by the orchestration layer
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configured sync root is not a usable absolute path
    #[error("Invalid sync root: {0}")]
    InvalidRoot(String),

    /// The configured default conflict strategy is not a known value
    #[error("Unknown conflict strategy in configuration: {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
