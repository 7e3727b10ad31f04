//! Error types for the login subsystem.

use portico_browser::BrowserError;
use thiserror::Error;

/// Errors that can occur during login orchestration.
#[derive(Debug, Error)]
pub enum LoginError {
    /// Session-level browser failure
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// The attempt ended in a failure that a fresh attempt may not repeat
    #[error("attempt failed: {0}")]
    AttemptFailed(String),

    /// The step loop ran out of iterations without a terminal outcome
    #[error("step budget exhausted: {0}")]
    StepBudgetExhausted(String),

    /// Every attempt failed
    #[error("all {attempts} login attempts failed; last error: {last_error}")]
    AttemptsExhausted {
        /// How many attempts were made
        attempts: u32,
        /// Failure message of the final attempt
        last_error: String,
    },
}

impl LoginError {
    /// True when retrying with a fresh session cannot help.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Browser(e) if e.is_fatal())
    }
}

/// Result type for login operations.
pub type Result<T> = std::result::Result<T, LoginError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_display() {
        let err = LoginError::AttemptFailed("captcha unsolved".to_string());
        assert_eq!(err.to_string(), "attempt failed: captcha unsolved");
    }

    #[test]
    fn test_fatal_classification() {
        let fatal = LoginError::Browser(BrowserError::CertificateMissing(PathBuf::from(
            "/tmp/cert.pfx",
        )));
        assert!(fatal.is_fatal());

        let retryable = LoginError::Browser(BrowserError::ConnectError("refused".to_string()));
        assert!(!retryable.is_fatal());
        assert!(!LoginError::AttemptFailed("x".to_string()).is_fatal());
    }

    #[test]
    fn test_exhausted_display_carries_context() {
        let err = LoginError::AttemptsExhausted {
            attempts: 3,
            last_error: "navigation timeout".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains('3'));
        assert!(text.contains("navigation timeout"));
    }
}
