//! Reconciler error types

use driftsync_core::domain::DomainError;
use driftsync_index::IndexError;
use thiserror::Error;

/// Errors surfaced while applying events
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Event path is not under the configured sync root
    #[error("Path outside sync root: {0}")]
    OutsideRoot(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
