//! Error types for request parsing

use thiserror::Error;

/// Result type alias using [`ValidationError`]
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Validation failures raised while parsing request DTOs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Param `{param}` is not valid JSON: {reason}")]
    MalformedJson { param: String, reason: String },

    #[error("{param} must be one of: {}", accepted.join(", "))]
    NotOneOf {
        param: String,
        value: String,
        accepted: Vec<String>,
    },

    #[error("Param `{param}` has the wrong type: expected {expected}")]
    WrongType { param: String, expected: String },

    #[error("Param `{param}` must be a valid integer")]
    NotAnInteger { param: String },

    #[error("Param `{param}` must be a non-negative integer")]
    Negative { param: String },
}

impl ValidationError {
    /// Name of the query parameter that failed validation
    pub fn param(&self) -> &str {
        match self {
            ValidationError::MalformedJson { param, .. }
            | ValidationError::NotOneOf { param, .. }
            | ValidationError::WrongType { param, .. }
            | ValidationError::NotAnInteger { param }
            | ValidationError::Negative { param } => param,
        }
    }
}
