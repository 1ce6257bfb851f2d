//! DriftSync Reconcile - Event-to-operation translation
//!
//! Consumes local filesystem events and remote change-feed pages, mutates
//! the index accordingly, and derives the operations the transfer scheduler
//! should run. The reconciler is driven from a single task; the engine
//! serializes all events through it so index mutations per item never race.
//!
//! The selective sync tree lives here too: it filters which paths are
//! eligible for transfer scheduling at all.

pub mod error;
pub mod events;
pub mod reconciler;
pub mod selection;

pub use error::ReconcileError;
pub use events::{FileEvent, FileEventKind};
pub use reconciler::Reconciler;
pub use selection::SelectiveSyncTree;
