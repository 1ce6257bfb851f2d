//! SQLite persistence for DriftSync
//!
//! Implements the `StateStore` port from `driftsync-core` using SQLite,
//! a driven (secondary) adapter in the hexagonal architecture. Everything
//! that must survive a restart lives here: the item index, the pending
//! operation queue, resumable transfer sessions, the remote change cursor,
//! and the permanent-failure audit.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - connection pool with schema creation
//! - [`SqliteStateStore`] - full `StateStore` implementation

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteStateStore;
