//! Transfer sessions
//!
//! A [`TransferSession`] tracks one resumable transfer of a single item.
//! Progress checkpoints persist through the state store so an interrupted
//! transfer resumes from the last confirmed chunk instead of byte zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{ItemId, OperationId, ResumeToken, SessionId};

/// Direction of a transfer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "upload"),
            TransferDirection::Download => write!(f, "download"),
        }
    }
}

/// Role of this node in a direct peer-to-peer transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    Sender,
    Receiver,
}

/// Lifecycle state of a transfer session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Active,
    /// Suspended, resumable with the stored token
    Suspended,
    Completed,
    /// Abandoned; resume data is invalid
    Aborted,
}

/// One resumable transfer of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSession {
    id: SessionId,
    operation_id: OperationId,
    item_id: ItemId,
    direction: TransferDirection,
    /// Set only for direct peer transfers; cloud transfers carry None
    peer_role: Option<PeerRole>,
    total_bytes: u64,
    transferred_bytes: u64,
    /// Provider- or peer-issued token for resuming after interruption
    resume_token: Option<ResumeToken>,
    state: SessionState,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransferSession {
    pub fn new(
        operation_id: OperationId,
        item_id: ItemId,
        direction: TransferDirection,
        total_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            operation_id,
            item_id,
            direction,
            peer_role: None,
            total_bytes,
            transferred_bytes: 0,
            resume_token: None,
            state: SessionState::Active,
            started_at: now,
            updated_at: now,
        }
    }

    /// Creates a session for a direct peer-to-peer transfer
    pub fn new_peer(
        operation_id: OperationId,
        item_id: ItemId,
        direction: TransferDirection,
        role: PeerRole,
        total_bytes: u64,
    ) -> Self {
        let mut session = Self::new(operation_id, item_id, direction, total_bytes);
        session.peer_role = Some(role);
        session
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    pub fn peer_role(&self) -> Option<PeerRole> {
        self.peer_role
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    pub fn resume_token(&self) -> Option<&ResumeToken> {
        self.resume_token.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Fraction of the transfer completed, clamped to [0.0, 1.0]
    ///
    /// An empty file reports 1.0 once any checkpoint has been recorded,
    /// 0.0 before.
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.transferred_bytes > 0 || self.state == SessionState::Completed {
                1.0
            } else {
                0.0
            };
        }
        (self.transferred_bytes as f64 / self.total_bytes as f64).clamp(0.0, 1.0)
    }

    /// Records a confirmed chunk and the token that resumes after it
    ///
    /// # Errors
    /// Fails if the session is not active or the checkpoint would move
    /// progress backwards.
    pub fn checkpoint(
        &mut self,
        transferred_bytes: u64,
        resume_token: Option<ResumeToken>,
    ) -> Result<(), DomainError> {
        if self.state != SessionState::Active {
            return Err(DomainError::ValidationFailed(format!(
                "Cannot checkpoint a {:?} session",
                self.state
            )));
        }
        if transferred_bytes < self.transferred_bytes {
            return Err(DomainError::ValidationFailed(
                "Checkpoint would move progress backwards".to_string(),
            ));
        }
        self.transferred_bytes = transferred_bytes.min(self.total_bytes.max(transferred_bytes));
        if resume_token.is_some() {
            self.resume_token = resume_token;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Suspends the session for later resumption
    pub fn suspend(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Suspended;
            self.updated_at = Utc::now();
        }
    }

    /// Reactivates a suspended session
    ///
    /// # Errors
    /// Fails for completed or aborted sessions.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        match self.state {
            SessionState::Suspended => {
                self.state = SessionState::Active;
                self.updated_at = Utc::now();
                Ok(())
            }
            SessionState::Active => Ok(()),
            other => Err(DomainError::ValidationFailed(format!(
                "Cannot resume a {:?} session",
                other
            ))),
        }
    }

    /// Marks the transfer finished; progress jumps to completion
    pub fn complete(&mut self) {
        self.state = SessionState::Completed;
        self.transferred_bytes = self.total_bytes;
        self.resume_token = None;
        self.updated_at = Utc::now();
    }

    /// Abandons the session; the resume token is discarded
    pub fn abort(&mut self) {
        self.state = SessionState::Aborted;
        self.resume_token = None;
        self.updated_at = Utc::now();
    }
}
