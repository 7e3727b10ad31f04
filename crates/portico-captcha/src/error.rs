//! Error types for the solver subsystem.

use thiserror::Error;

/// Errors that can occur while talking to the remote solver.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The protocol call to the solver failed outright
    #[error("solver protocol error: {0}")]
    Protocol(String),

    /// The solver replied, but the reply had no usable status
    #[error("malformed solver reply: {0}")]
    MalformedReply(String),
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SolverError::Protocol("session closed".to_string());
        assert_eq!(err.to_string(), "solver protocol error: session closed");
    }

    #[test]
    fn test_malformed_reply_carries_payload() {
        let err = SolverError::MalformedReply("{\"foo\":1}".to_string());
        assert!(err.to_string().contains("foo"));
    }
}
