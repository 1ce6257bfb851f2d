//! DriftSync Index - Authoritative item registry
//!
//! In-memory registry of every tracked [`SyncItem`], keyed by id with
//! secondary lookups by local path and remote id. All state transitions go
//! through the index so every change is observable on the status broadcast
//! channel and the (local path, remote id) uniqueness invariant holds in
//! one place.
//!
//! [`SyncItem`]: driftsync_core::domain::SyncItem

pub mod error;
pub mod index;

pub use error::IndexError;
pub use index::{StatusStatistics, SyncIndex};
