//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Variable names must contain at least one non-whitespace character
    #[error("Invalid variable name: {name:?}")]
    InvalidVariableName { name: String },

    /// A JSON value that has no process variable representation
    #[error("Unsupported value: {reason}")]
    UnsupportedValue { reason: String },
}

impl DomainError {
    /// Creates an unsupported value error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedValue {
            reason: reason.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
