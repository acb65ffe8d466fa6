//! Gemini-specific error types.

use hl_safety::GenerationError;
use thiserror::Error;

/// Gemini-specific errors.
#[derive(Error, Debug)]
pub enum GeminiError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Gemini API returned an error
    #[error("Gemini API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The reply carried no candidate text
    #[error("Gemini returned no text")]
    EmptyResponse,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GeminiError {
    /// Check if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Json(_) | Self::EmptyResponse | Self::Config(_) => false,
        }
    }
}

impl From<GeminiError> for GenerationError {
    fn from(err: GeminiError) -> Self {
        Self::with_source("gemini generateContent failed", err)
    }
}

/// Result type for Gemini operations.
pub type GeminiResult<T> = Result<T, GeminiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn api_error_display() {
        let err = GeminiError::Api {
            status: 429,
            message: "Resource has been exhausted".into(),
        };
        assert_eq!(
            err.to_string(),
            "Gemini API error 429: Resource has been exhausted"
        );
        assert!(err.is_retryable());
        assert!(!GeminiError::EmptyResponse.is_retryable());
    }

    #[test]
    fn converts_to_generation_error_with_source() {
        let err: GenerationError = GeminiError::EmptyResponse.into();
        assert_eq!(err.message(), "gemini generateContent failed");
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("Gemini returned no text".to_string())
        );
    }
}
