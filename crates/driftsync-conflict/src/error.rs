//! Conflict error types

use driftsync_core::domain::{ConflictKind, DomainError, ResolutionStrategy};
use driftsync_index::IndexError;
use thiserror::Error;

/// Errors surfaced during conflict resolution
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The requested strategy is not legal for this conflict kind
    #[error("Strategy {strategy} is not legal for a {kind} conflict")]
    InvalidResolution {
        strategy: ResolutionStrategy,
        kind: ConflictKind,
    },

    /// The item is not in conflict
    #[error("Item is not in conflict: {0}")]
    NotInConflict(String),

    /// Applying the chosen strategy failed; the item stays in conflict
    #[error("Resolution could not be applied: {0}")]
    ApplyFailed(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
