//! Domain error types

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid local path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Invalid remote id format
    #[error("Invalid remote id: {0}")]
    InvalidRemoteId(String),

    /// Invalid content hash
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// Invalid change-feed cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Invalid transfer resume token
    #[error("Invalid resume token: {0}")]
    InvalidResumeToken(String),

    /// ID parsing error
    #[error("Invalid id format: {0}")]
    InvalidId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Transport-level errors surfaced by the cloud and peer ports
///
/// The variants double as the retry taxonomy: the retry engine classifies
/// each one as transient, environmental, or structural (see
/// `driftsync-retry`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection-level failure (refused, reset, DNS, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Provider asked us to back off
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the provider asked us to wait
        retry_after_secs: u64,
    },

    /// Credentials rejected or expired
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Cloud storage quota exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Local or remote permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Local disk has no space for the transfer
    #[error("Disk space full: {0}")]
    DiskSpaceFull(String),

    /// Remote item disappeared mid-operation
    #[error("Remote item not found: {0}")]
    NotFound(String),

    /// Post-transfer hash verification failed
    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Hash the index expected
        expected: String,
        /// Hash computed over the transferred bytes
        actual: String,
    },

    /// A stored resume token was rejected by the provider
    #[error("Resume token rejected: {0}")]
    StaleResumeToken(String),

    /// Anything the adapter could not map to a specific variant
    #[error("Transport failure: {0}")]
    Other(String),
}
