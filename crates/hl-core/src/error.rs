//! Core error types.

use thiserror::Error;

/// Errors raised while building or validating core values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A location record failed validation.
    #[error("invalid location record: {0}")]
    InvalidRecord(String),

    /// A subject identifier is empty or contains unsupported characters.
    #[error("invalid subject id '{0}'")]
    InvalidSubjectId(String),

    /// The mode switch named an unknown role.
    #[error("unknown role '{0}' (expected reporter or observer)")]
    UnknownRole(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
