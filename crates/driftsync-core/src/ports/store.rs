//! State store port (driven/secondary port)
//!
//! Persistence interface for everything that must survive a restart: the
//! item index, the pending operation queue, resumable transfer sessions,
//! the remote change cursor, and the permanent-failure audit.
//!
//! `driftsync-store` provides the SQLite implementation; tests use
//! in-memory doubles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::item::SyncItem;
use crate::domain::newtypes::{Cursor, ItemId, OperationId, SessionId};
use crate::domain::operation::{OperationKind, SyncOperation};
use crate::domain::session::TransferSession;

/// Errors surfaced by state store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into a domain type
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// The requested row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Audit record of an operation that exhausted its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub item_id: ItemId,
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub retry_count: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    /// Set once the user or a later successful sync addressed the failure
    pub resolved: bool,
}

/// Port trait for durable engine state
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    // --- Index ---

    /// Loads every non-tombstoned item
    async fn load_items(&self) -> Result<Vec<SyncItem>, StoreError>;

    /// Inserts or replaces an item by id
    async fn save_item(&self, item: &SyncItem) -> Result<(), StoreError>;

    /// Removes an item row entirely
    async fn delete_item(&self, id: &ItemId) -> Result<(), StoreError>;

    // --- Operation queue ---

    /// Loads pending operations in creation order
    async fn load_operations(&self) -> Result<Vec<SyncOperation>, StoreError>;

    async fn save_operation(&self, op: &SyncOperation) -> Result<(), StoreError>;

    async fn delete_operation(&self, id: &OperationId) -> Result<(), StoreError>;

    // --- Transfer sessions ---

    /// Loads sessions that can still be resumed
    async fn load_sessions(&self) -> Result<Vec<TransferSession>, StoreError>;

    async fn save_session(&self, session: &TransferSession) -> Result<(), StoreError>;

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError>;

    // --- Remote cursor ---

    async fn load_cursor(&self) -> Result<Option<Cursor>, StoreError>;

    async fn save_cursor(&self, cursor: &Cursor) -> Result<(), StoreError>;

    // --- Failure audit ---

    async fn record_failure(&self, record: &FailureRecord) -> Result<(), StoreError>;

    /// Returns failures, unresolved first, newest first within each group
    async fn list_failures(&self) -> Result<Vec<FailureRecord>, StoreError>;

    /// Marks a failure record resolved
    async fn resolve_failure(&self, operation_id: &OperationId) -> Result<(), StoreError>;
}
