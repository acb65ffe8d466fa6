//! Gemini connector.
//!
//! Implements [`hl_safety::TextGenerator`] over the Gemini
//! `generateContent` REST API with JSON-mode replies.

#![forbid(unsafe_code)]

mod client;
mod error;
pub mod types;

pub use client::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiClient, GeminiConfig};
pub use error::{GeminiError, GeminiResult};
