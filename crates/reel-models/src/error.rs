//! Validation errors for request payloads.

use thiserror::Error;

/// Result type for model validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Structural problems found in a submitted payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{field} is out of range: {message}")]
    OutOfRange { field: &'static str, message: String },

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ModelError {
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    pub fn out_of_range(field: &'static str, message: impl Into<String>) -> Self {
        Self::OutOfRange {
            field,
            message: message.into(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
