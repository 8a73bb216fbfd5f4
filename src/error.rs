//! Error types for SIMCO Proctor

use thiserror::Error;

/// Errors that can occur while running a proctored session
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Time is up")]
    Timeout,

    #[error("Exclusive display mode was not restored in time")]
    DistractionExpiry,

    #[error("Landmark detection unavailable: {0}")]
    DetectionUnavailable(String),

    #[error("Cannot {action} while in phase {phase}")]
    InvalidTransition { phase: String, action: &'static str },

    #[error("No option selected")]
    NoSelection,

    #[error("Unknown option: {0}")]
    UnknownOption(char),

    #[error("Confidence must be between 0 and 100, got {0}")]
    InvalidConfidence(u8),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("A backend request is already in flight")]
    RequestPending,

    #[error("Not enough landmarks: need {needed}, got {got}")]
    InsufficientLandmarks { needed: usize, got: usize },

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProctorError {
    /// Fatal errors terminate the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProctorError::Timeout | ProctorError::DistractionExpiry)
    }

    /// Retryable errors leave local state intact and can be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProctorError::PermissionDenied(_) | ProctorError::NetworkFailure(_)
        )
    }
}

impl From<reqwest::Error> for ProctorError {
    fn from(e: reqwest::Error) -> Self {
        ProctorError::NetworkFailure(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_and_retryable_classes() {
        assert!(ProctorError::Timeout.is_fatal());
        assert!(ProctorError::DistractionExpiry.is_fatal());
        assert!(!ProctorError::NetworkFailure("down".into()).is_fatal());

        assert!(ProctorError::PermissionDenied("camera".into()).is_retryable());
        assert!(ProctorError::NetworkFailure("down".into()).is_retryable());
        assert!(!ProctorError::DetectionUnavailable("wasm".into()).is_retryable());
        assert!(!ProctorError::Timeout.is_retryable());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = ProctorError::InvalidTransition {
            phase: "completed".to_string(),
            action: "submit an answer",
        };
        assert_eq!(err.to_string(), "Cannot submit an answer while in phase completed");
    }
}
