//! Global pause state machine
//!
//! Environmental failures pause the whole engine rather than burning
//! per-item retries against the same wall. The state lives in a
//! `tokio::sync::watch` channel so workers observe transitions instead of
//! polling an ambient flag. Transient reasons auto-resume when the
//! condition clears; credential and permission problems wait for an
//! explicit user resume.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use driftsync_core::config::RetryConfig;

/// Why the engine is globally paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    DiskSpaceFull,
    NetworkUnavailable,
    AuthenticationFailed,
    QuotaExceeded,
    PermissionDenied,
    DatabaseCorrupted,
    /// The rolling error-rate window crossed its threshold
    TooManyErrors,
}

impl PauseReason {
    /// Reasons that never auto-resume; the user must act first
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            PauseReason::AuthenticationFailed | PauseReason::PermissionDenied
        )
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PauseReason::DiskSpaceFull => "disk space full",
            PauseReason::NetworkUnavailable => "network unavailable",
            PauseReason::AuthenticationFailed => "authentication failed",
            PauseReason::QuotaExceeded => "quota exceeded",
            PauseReason::PermissionDenied => "permission denied",
            PauseReason::DatabaseCorrupted => "database corrupted",
            PauseReason::TooManyErrors => "too many errors",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle state observed by every worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    Paused(PauseReason),
    Stopping,
}

impl EngineState {
    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::Running)
    }
}

/// Owns the engine state channel and the rolling error-rate window
pub struct PauseController {
    state: watch::Sender<EngineState>,
    /// Failure timestamps inside the rolling window
    window: Mutex<VecDeque<Instant>>,
    window_span: Duration,
    window_threshold: usize,
}

impl PauseController {
    pub fn new(config: &RetryConfig) -> Self {
        let (state, _) = watch::channel(EngineState::Running);
        Self {
            state,
            window: Mutex::new(VecDeque::new()),
            window_span: Duration::from_secs(config.error_window_secs),
            window_threshold: config.error_window_threshold as usize,
        }
    }

    /// A receiver for workers to observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Pauses the engine; an existing pause keeps its original reason
    pub fn pause(&self, reason: PauseReason) {
        let current = self.state();
        match current {
            EngineState::Running => {
                warn!(%reason, "engine paused");
                self.state.send_replace(EngineState::Paused(reason));
            }
            EngineState::Paused(existing) => {
                if existing != reason {
                    info!(%reason, holding = %existing, "pause requested while already paused");
                }
            }
            EngineState::Stopping => {}
        }
    }

    /// Explicit user resume; clears any pause reason
    pub fn resume(&self) {
        if let EngineState::Paused(reason) = self.state() {
            info!(%reason, "engine resumed by user");
            self.window.lock().unwrap().clear();
            self.state.send_replace(EngineState::Running);
        }
    }

    /// Resumes only if the current reason clears on its own
    ///
    /// Returns false (and stays paused) for reasons that require explicit
    /// user action, or when the engine is not paused.
    pub fn auto_resume(&self) -> bool {
        match self.state() {
            EngineState::Paused(reason) if !reason.requires_user_action() => {
                info!(%reason, "pause condition cleared, resuming");
                self.window.lock().unwrap().clear();
                self.state.send_replace(EngineState::Running);
                true
            }
            _ => false,
        }
    }

    /// Begins shutdown; no further transitions occur
    pub fn stop(&self) {
        self.state.send_replace(EngineState::Stopping);
    }

    /// Records a failed attempt in the rolling window
    ///
    /// Crossing the threshold pauses the engine with
    /// [`PauseReason::TooManyErrors`] and returns that reason.
    pub fn record_failure(&self) -> Option<PauseReason> {
        let now = Instant::now();
        let over_threshold = {
            let mut window = self.window.lock().unwrap();
            window.push_back(now);
            while let Some(front) = window.front() {
                if now.duration_since(*front) > self.window_span {
                    window.pop_front();
                } else {
                    break;
                }
            }
            window.len() >= self.window_threshold
        };
        if over_threshold && self.is_running() {
            self.pause(PauseReason::TooManyErrors);
            return Some(PauseReason::TooManyErrors);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_config(threshold: u32) -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_secs: 1,
            max_delay_secs: 60,
            error_window_secs: 300,
            error_window_threshold: threshold,
        }
    }

    mod state_tests {
        use super::*;

        #[test]
        fn test_starts_running() {
            let controller = PauseController::new(&retry_config(10));
            assert!(controller.is_running());
        }

        #[test]
        fn test_pause_and_user_resume() {
            let controller = PauseController::new(&retry_config(10));
            controller.pause(PauseReason::DiskSpaceFull);
            assert_eq!(
                controller.state(),
                EngineState::Paused(PauseReason::DiskSpaceFull)
            );
            controller.resume();
            assert!(controller.is_running());
        }

        #[test]
        fn test_first_pause_reason_sticks() {
            let controller = PauseController::new(&retry_config(10));
            controller.pause(PauseReason::NetworkUnavailable);
            controller.pause(PauseReason::QuotaExceeded);
            assert_eq!(
                controller.state(),
                EngineState::Paused(PauseReason::NetworkUnavailable)
            );
        }

        #[test]
        fn test_stop_is_terminal_for_pause() {
            let controller = PauseController::new(&retry_config(10));
            controller.stop();
            controller.pause(PauseReason::DiskSpaceFull);
            assert_eq!(controller.state(), EngineState::Stopping);
        }

        #[test]
        fn test_subscribers_observe_transitions() {
            let controller = PauseController::new(&retry_config(10));
            let rx = controller.subscribe();
            controller.pause(PauseReason::QuotaExceeded);
            assert_eq!(*rx.borrow(), EngineState::Paused(PauseReason::QuotaExceeded));
        }
    }

    mod resume_tests {
        use super::*;

        #[test]
        fn test_auto_resume_for_transient_reason() {
            let controller = PauseController::new(&retry_config(10));
            controller.pause(PauseReason::NetworkUnavailable);
            assert!(controller.auto_resume());
            assert!(controller.is_running());
        }

        #[test]
        fn test_auth_pause_needs_explicit_resume() {
            let controller = PauseController::new(&retry_config(10));
            controller.pause(PauseReason::AuthenticationFailed);
            assert!(!controller.auto_resume());
            assert_eq!(
                controller.state(),
                EngineState::Paused(PauseReason::AuthenticationFailed)
            );

            controller.resume();
            assert!(controller.is_running());
        }

        #[test]
        fn test_permission_pause_needs_explicit_resume() {
            let controller = PauseController::new(&retry_config(10));
            controller.pause(PauseReason::PermissionDenied);
            assert!(!controller.auto_resume());
        }
    }

    mod window_tests {
        use super::*;

        #[test]
        fn test_window_threshold_triggers_too_many_errors() {
            let controller = PauseController::new(&retry_config(3));
            assert!(controller.record_failure().is_none());
            assert!(controller.record_failure().is_none());
            assert_eq!(
                controller.record_failure(),
                Some(PauseReason::TooManyErrors)
            );
            assert_eq!(
                controller.state(),
                EngineState::Paused(PauseReason::TooManyErrors)
            );
        }

        #[test]
        fn test_resume_clears_the_window() {
            let controller = PauseController::new(&retry_config(2));
            controller.record_failure();
            controller.record_failure();
            controller.resume();
            // A single new failure does not immediately re-trip.
            assert!(controller.record_failure().is_none());
        }
    }
}
