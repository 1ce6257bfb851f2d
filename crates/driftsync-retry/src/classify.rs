//! Failure taxonomy
//!
//! Every transport failure falls into one of four classes that decide what
//! happens next: transient failures retry with backoff, environmental ones
//! pause the whole engine, structural ones fail immediately, and integrity
//! mismatches become conflicts rather than silent overwrites.

use driftsync_core::domain::TransportError;

use crate::pause::PauseReason;

/// What a failure means for the operation that hit it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying with backoff
    Transient,
    /// The whole engine pauses; per-item retries would all hit the same wall
    Environmental(PauseReason),
    /// Never retried; surfaced immediately
    Structural,
    /// Post-transfer hash mismatch; handled as a fresh conflict
    DataIntegrity,
}

/// Classifies a transport failure
pub fn classify(error: &TransportError) -> ErrorClass {
    match error {
        TransportError::Network(_) | TransportError::RateLimited { .. } => ErrorClass::Transient,
        // The provider forgot the upload; the restarted attempt may succeed.
        TransportError::StaleResumeToken(_) => ErrorClass::Transient,

        TransportError::AuthenticationFailed(_) => {
            ErrorClass::Environmental(PauseReason::AuthenticationFailed)
        }
        TransportError::PermissionDenied(_) => {
            ErrorClass::Environmental(PauseReason::PermissionDenied)
        }
        TransportError::QuotaExceeded(_) => ErrorClass::Environmental(PauseReason::QuotaExceeded),
        TransportError::DiskSpaceFull(_) => ErrorClass::Environmental(PauseReason::DiskSpaceFull),

        TransportError::NotFound(_) | TransportError::Other(_) => ErrorClass::Structural,

        TransportError::IntegrityMismatch { .. } => ErrorClass::DataIntegrity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_failures() {
        assert_eq!(
            classify(&TransportError::Network("reset".into())),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&TransportError::RateLimited {
                retry_after_secs: 30
            }),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&TransportError::StaleResumeToken("tok".into())),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_environmental_failures_carry_pause_reason() {
        assert_eq!(
            classify(&TransportError::DiskSpaceFull("/sync".into())),
            ErrorClass::Environmental(PauseReason::DiskSpaceFull)
        );
        assert_eq!(
            classify(&TransportError::QuotaExceeded("5 GB".into())),
            ErrorClass::Environmental(PauseReason::QuotaExceeded)
        );
        assert_eq!(
            classify(&TransportError::AuthenticationFailed("expired".into())),
            ErrorClass::Environmental(PauseReason::AuthenticationFailed)
        );
        assert_eq!(
            classify(&TransportError::PermissionDenied("read-only".into())),
            ErrorClass::Environmental(PauseReason::PermissionDenied)
        );
    }

    #[test]
    fn test_structural_failures() {
        assert_eq!(
            classify(&TransportError::NotFound("R1".into())),
            ErrorClass::Structural
        );
        assert_eq!(
            classify(&TransportError::Other("bad request".into())),
            ErrorClass::Structural
        );
    }

    #[test]
    fn test_integrity_mismatch() {
        let err = TransportError::IntegrityMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert_eq!(classify(&err), ErrorClass::DataIntegrity);
    }
}
