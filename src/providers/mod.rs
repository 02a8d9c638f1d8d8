//! Completion adapters, one per upstream backend.
//!
//! Each adapter owns its wire types as tagged serde structs and normalizes
//! them through one mapping function into [`crate::types::CompletionResponse`].
//! The normalization contracts differ per backend and are preserved here:
//!
//! - `openai`: usage reported inline with the response; streams via
//!   sentinel-terminated SSE chunks, invalid chunks skipped.
//! - `anthropic`: content-block array with role remap; usage counters may be
//!   omitted entirely and default to zero.
//! - `ollama`: alternate usage field names; no per-chunk token guarantee, so
//!   streaming degrades to await-full-then-yield-once.

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use std::time::Duration;

use secrecy::SecretString;

use crate::error::AiError;

/// Connection settings shared by HTTP-backed adapters.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    /// Bounded per-request timeout (hardening; upstream calls never hang)
    pub timeout: Duration,
}

impl AdapterConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Build a reqwest client honoring the adapter timeout.
pub(crate) fn build_http_client(config: &AdapterConfig) -> Result<reqwest::Client, AiError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(AiError::from)
}

/// Map a non-success HTTP response into [`AiError::ApiError`], keeping the
/// raw body as opaque details when it parses as JSON.
pub(crate) async fn error_for_response(response: reqwest::Response) -> AiError {
    let code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let details = serde_json::from_str::<serde_json::Value>(&body).ok();
    let message = details
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or(body);
    AiError::ApiError {
        code,
        message,
        details,
    }
}
