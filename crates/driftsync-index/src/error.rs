//! Index error types

use driftsync_core::domain::{DomainError, ItemId};
use thiserror::Error;

/// Errors surfaced by index operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    /// Mutation addressed an identity the index does not hold
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// Upsert would give two items the same local path or remote id
    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// A domain rule rejected the mutation
    #[error(transparent)]
    Domain(#[from] DomainError),
}
