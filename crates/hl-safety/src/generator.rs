//! Text-generation seam.

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One structured generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Natural-language instruction.
    pub prompt: String,
    /// Schema the reply must follow (OpenAPI subset, upper-case type names).
    pub response_schema: Value,
}

/// Failure reported by a text generator.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GenerationError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl GenerationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for text generation.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// A generative-text backend.
#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Generate the raw reply text for `request`.
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_keeps_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = GenerationError::with_source("request failed", io);
        assert_eq!(err.to_string(), "request failed");
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("reset by peer".to_string())
        );
        assert!(GenerationError::new("empty").source().is_none());
    }
}
