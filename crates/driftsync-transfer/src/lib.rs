//! Transfer execution for DriftSync
//!
//! Takes the operations the reconciler derives and moves the bytes:
//! chunked, resumable uploads and downloads against the cloud transport,
//! metadata propagation (deletes, moves, folder creation), an optional
//! direct peer-to-peer lane, and the bandwidth governor that rations
//! throughput across everything in flight.
//!
//! The [`TransferScheduler`] is the crate's entry point; the engine feeds
//! it operations and drives [`TransferScheduler::run_next`] from its worker
//! tasks.

pub mod error;
pub mod governor;
pub mod peer;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod worker;

pub use error::TransferError;
pub use governor::{Admission, BandwidthGovernor};
pub use peer::PeerLane;
pub use queue::TransferQueue;
pub use scheduler::TransferScheduler;
pub use stats::{TransferStatistics, TransferStatsSnapshot};
pub use worker::{TransferWorker, CHUNK_SIZE};
