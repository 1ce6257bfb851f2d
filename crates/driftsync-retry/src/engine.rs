//! Retry policy
//!
//! Decides what happens after a failed attempt: retry with exponential
//! backoff, pause the engine, record a permanent failure, or raise a
//! conflict for an integrity mismatch. Operations retry while the attempt
//! count stays under `max_retries` and the operation has not outlived its
//! 24-hour TTL; exhausted operations are recorded, never silently dropped.

use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use driftsync_core::config::RetryConfig;
use driftsync_core::domain::{SyncOperation, TransportError};
use driftsync_core::ports::FailureRecord;

use crate::classify::{classify, ErrorClass};
use crate::pause::PauseReason;

/// What to do with a failed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after the delay
    Retry { delay: Duration },
    /// Stop everything; per-item retries cannot fix this
    Pause(PauseReason),
    /// Record the failure and leave the item in error state
    PermanentFailure,
    /// Treat as a fresh conflict, never a silent overwrite
    IntegrityConflict,
}

/// Applies the retry policy to failed attempts
pub struct RetryEngine {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryEngine {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// Backoff before attempt number `attempt` (zero-based): base·2^n, capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(32));
        let delay = self
            .base_delay
            .saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }

    /// Whether the operation has retry budget left
    pub fn can_retry(&self, op: &SyncOperation) -> bool {
        op.attempts() < self.max_retries && !op.is_expired()
    }

    /// Decides the outcome of a failed attempt
    pub fn assess(&self, op: &SyncOperation, error: &TransportError) -> RetryDecision {
        match classify(error) {
            ErrorClass::Transient => {
                if self.can_retry(op) {
                    let mut delay = self.backoff_delay(op.attempts());
                    // Honor the provider's back-off request as a floor.
                    if let TransportError::RateLimited { retry_after_secs } = error {
                        delay = delay.max(Duration::from_secs(*retry_after_secs));
                    }
                    debug!(
                        item_id = %op.item_id(),
                        attempts = op.attempts(),
                        delay_secs = delay.as_secs(),
                        "transient failure, will retry"
                    );
                    RetryDecision::Retry { delay }
                } else {
                    RetryDecision::PermanentFailure
                }
            }
            ErrorClass::Environmental(reason) => RetryDecision::Pause(reason),
            ErrorClass::Structural => RetryDecision::PermanentFailure,
            ErrorClass::DataIntegrity => RetryDecision::IntegrityConflict,
        }
    }

    /// Builds the audit record for an exhausted operation
    pub fn failure_record(&self, op: &SyncOperation) -> FailureRecord {
        FailureRecord {
            item_id: *op.item_id(),
            operation_id: *op.id(),
            kind: op.kind(),
            retry_count: op.attempts(),
            reason: op.last_error().unwrap_or("unknown").to_string(),
            failed_at: Utc::now(),
            resolved: false,
        }
    }
}
