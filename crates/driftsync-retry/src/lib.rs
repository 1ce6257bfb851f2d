//! Failure handling for DriftSync
//!
//! Three pieces work together: the taxonomy in [`classify`] sorts transport
//! failures into transient, environmental, structural, and data-integrity
//! classes; the [`RetryEngine`] turns a classified failure into a decision
//! (backoff retry, global pause, permanent failure, or conflict); and the
//! [`PauseController`] holds the engine-wide pause state machine that
//! environmental failures and the rolling error-rate window drive.

pub mod classify;
pub mod engine;
pub mod pause;

pub use classify::{classify, ErrorClass};
pub use engine::{RetryDecision, RetryEngine};
pub use pause::{EngineState, PauseController, PauseReason};
