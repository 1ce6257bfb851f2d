//! DriftSync Engine - Orchestration layer
//!
//! Assembles the index, reconciler, conflict resolver, transfer scheduler,
//! offline cache, retry engine, and state store into one running system.
//! The host application provides the transport adapters (cloud, peer,
//! local disk) and the file-watcher events; everything between those edges
//! happens here.
//!
//! ## Key Components
//!
//! - [`SyncEngine`] - construction, startup restore, background tasks,
//!   and the control surface (pause/resume, selection, conflicts)
//! - [`DiagnosticReport`] - point-in-time component health snapshot

pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod logging;

pub use diagnostics::{DiagnosticReport, SystemHealthStatus};
pub use engine::SyncEngine;
pub use error::EngineError;
pub use logging::init_tracing;
