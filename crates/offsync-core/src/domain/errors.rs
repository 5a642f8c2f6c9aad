//! Domain error types
//!
//! Validation failures raised while building domain values from
//! untrusted input (keys, strategy names, manual-resolution choices).

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The logical key is empty or contains forbidden characters
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Unknown conflict resolution strategy name
    #[error("Invalid resolution strategy: {0}")]
    InvalidStrategy(String),

    /// Unknown manual resolution choice
    #[error("Invalid manual resolution choice: {0}")]
    InvalidChoice(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidKey(String::new());
        assert_eq!(err.to_string(), "Invalid key: ");

        let err = DomainError::InvalidStrategy("newest_wins".to_string());
        assert_eq!(err.to_string(), "Invalid resolution strategy: newest_wins");

        let err = DomainError::InvalidChoice("both".to_string());
        assert_eq!(err.to_string(), "Invalid manual resolution choice: both");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidKey("a/b".to_string());
        let err2 = DomainError::InvalidKey("a/b".to_string());
        let err3 = DomainError::InvalidKey("c/d".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
