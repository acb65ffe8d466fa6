//! Gemini API client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use hl_safety::{GenerationRequest, GenerationResult, TextGenerator};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{GeminiError, GeminiResult};
use crate::types::{ErrorEnvelope, GenerateContentRequest, GenerateContentResponse};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Per-request timeout. `0` leaves requests unbounded.
    pub timeout_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl GeminiConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: Url,
    model: String,
}

impl GeminiClient {
    /// Create a client.
    ///
    /// # Errors
    /// Returns `GeminiError::Config` for a blank key, an unusable base URL or
    /// model name, and `GeminiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &GeminiConfig) -> GeminiResult<Self> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(GeminiError::Config("API key is empty".into()));
        }
        let model = config.model.trim();
        if model.is_empty() || model.contains('/') {
            return Err(GeminiError::Config(format!("invalid model name {model:?}")));
        }

        let endpoint = Url::parse(&format!(
            "{}/v1beta/models/{model}:generateContent",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| GeminiError::Config(format!("invalid base URL {}: {e}", config.base_url)))?;

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| GeminiError::Config("API key contains invalid characters".into()))?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }

        Ok(Self {
            http: builder.build()?,
            endpoint,
            model: model.to_string(),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Call `generateContent`.
    ///
    /// # Errors
    /// Returns `GeminiError::Api` on a non-success status, `GeminiError::Http`
    /// on transport failure and `GeminiError::Json` for an undecodable body.
    #[instrument(skip(self, request), fields(model = %self.model))]
    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> GeminiResult<GenerateContentResponse> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message: api_message(&body),
            });
        }
        debug!(bytes = body.len(), "generateContent reply");
        Ok(serde_json::from_str(&body)?)
    }
}

fn api_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) => format!("{status}: {}", envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<String> {
        let body =
            GenerateContentRequest::json_reply(request.prompt.clone(), request.response_schema.clone());
        let response = self.generate_content(&body).await?;
        Ok(response.text().ok_or(GeminiError::EmptyResponse)?)
    }
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new(&GeminiConfig::new("key")).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn blank_key_is_rejected() {
        assert!(matches!(
            GeminiClient::new(&GeminiConfig::new("  ")),
            Err(GeminiError::Config(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let rendered = format!("{:?}", GeminiConfig::new("secret-key"));
        assert!(!rendered.contains("secret-key"));
    }

    #[test]
    fn api_message_prefers_envelope() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_message(body), "INVALID_ARGUMENT: API key not valid.");
        assert_eq!(api_message("Bad Gateway"), "Bad Gateway");
    }
}
