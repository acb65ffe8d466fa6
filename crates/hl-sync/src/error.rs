//! Position capture errors.

use std::time::Duration;

use thiserror::Error;

/// Why a position source could not produce a fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Access to the position source was refused.
    #[error("location permission denied: {0}")]
    PermissionDenied(String),

    /// No usable fix right now (no signal, source offline, bad report).
    #[error("position unavailable: {0}")]
    Unavailable(String),

    /// No fix arrived within the requested window.
    #[error("position request timed out after {0:?}")]
    Timeout(Duration),
}

impl CaptureError {
    /// A terminal error ends the watch; nothing further will arrive.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Result type for position capture.
pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_permission_denial_is_terminal() {
        assert!(CaptureError::PermissionDenied("gpsd".into()).is_terminal());
        assert!(!CaptureError::Unavailable("no fix".into()).is_terminal());
        assert!(!CaptureError::Timeout(Duration::from_secs(5)).is_terminal());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            CaptureError::Unavailable("2D fix only".into()).to_string(),
            "position unavailable: 2D fix only"
        );
        assert_eq!(
            CaptureError::Timeout(Duration::from_secs(5)).to_string(),
            "position request timed out after 5s"
        );
    }
}
