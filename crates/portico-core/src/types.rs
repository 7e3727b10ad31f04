//! Core domain types shared across Portico crates.

use crate::error::{PorticoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

static UUID_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn uuid_regex() -> &'static regex::Regex {
    UUID_REGEX.get_or_init(|| {
        regex::Regex::new(
            r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
        )
        .expect("valid regex")
    })
}

/// Unique identifier for one login attempt.
///
/// Wraps a UUID v4 string. Every independent attempt gets a fresh id so that
/// log lines from overlapping attempts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(String);

impl AttemptId {
    /// Create an attempt id from an existing UUID string.
    ///
    /// # Errors
    /// Returns `PorticoError::Validation` if the string is not a lowercase
    /// UUID v4.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if uuid_regex().is_match(&id) {
            Ok(Self(id))
        } else {
            Err(PorticoError::Validation(format!(
                "invalid attempt id: {id}"
            )))
        }
    }

    /// Generate a fresh attempt id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// View the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_id_valid() {
        let id = AttemptId::new("550e8400-e29b-41d4-a716-446655440000");
        assert!(id.is_ok());
        assert_eq!(
            id.unwrap().as_str(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_attempt_id_invalid() {
        assert!(AttemptId::new("not-a-uuid").is_err());
        assert!(AttemptId::new("").is_err());
        // Uppercase is rejected; ids are normalized lowercase
        assert!(AttemptId::new("550E8400-E29B-41D4-A716-446655440000").is_err());
    }

    #[test]
    fn test_attempt_id_generate() {
        let a = AttemptId::generate();
        let b = AttemptId::generate();
        assert_ne!(a, b);
        assert!(AttemptId::new(a.as_str()).is_ok());
    }

    #[test]
    fn test_attempt_id_display() {
        let id = AttemptId::generate();
        assert_eq!(format!("{id}"), id.as_str());
    }
}
