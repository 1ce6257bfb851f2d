//! DriftSync Conflict - Divergence detection and resolution
//!
//! Detects irreconcilable divergence between the local and cloud version of
//! an item, classifies it, and applies a resolution strategy chosen either
//! by per-path policy rules or explicitly by the user.
//!
//! Lifecycle: detected → resolving → resolved | error. A failed resolution
//! leaves the item in conflict for another attempt; nothing is dropped
//! silently.

pub mod detector;
pub mod error;
pub mod namer;
pub mod policy;
pub mod resolver;

pub use detector::ConflictDetector;
pub use error::ConflictError;
pub use policy::ConflictPolicy;
pub use resolver::{ConflictResolutionResult, ConflictResolver};
