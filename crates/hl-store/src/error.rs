//! Store error types.

use thiserror::Error;

/// Errors from store round-trips and the realtime channel.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend answered with a non-success status.
    #[error("store API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Store URL could not be parsed or converted.
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),

    /// Realtime channel failure (connect, join or protocol).
    #[error("realtime error: {0}")]
    Realtime(String),

    /// The store is reachable but refusing work.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the next natural trigger (next fix, next event) may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Realtime(_) | Self::Unavailable(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Json(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
