//! Port definitions
//!
//! Trait interfaces between the engine and the outside world, following the
//! hexagonal (ports and adapters) pattern. Adapter crates implement these;
//! the domain never imports an adapter.

pub mod local;
pub mod store;
pub mod transport;

pub use local::LocalStore;
pub use store::{FailureRecord, StateStore, StoreError};
pub use transport::{ChangeSet, CloudTransport, PeerTransport, RemoteChange, UploadProgress};
