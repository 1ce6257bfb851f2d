//! Domain model
//!
//! Pure business entities and rules. Nothing in this module performs I/O;
//! adapters live behind the traits in [`crate::ports`].

pub mod cache;
pub mod conflict;
pub mod errors;
pub mod events;
pub mod item;
pub mod newtypes;
pub mod operation;
pub mod session;

pub use cache::{CachePriority, OfflineCacheItem};
pub use conflict::{ConflictInfo, ConflictKind, ResolutionStrategy, VersionStamp};
pub use errors::{DomainError, TransportError};
pub use events::SyncEvent;
pub use item::{ItemKind, SyncItem, SyncState};
pub use newtypes::{
    ContentHash, Cursor, ItemId, LocalPath, OperationId, RemoteId, RemotePath, ResumeToken,
    SessionId,
};
pub use operation::{OperationKind, SyncOperation};
pub use session::{PeerRole, SessionState, TransferDirection, TransferSession};
