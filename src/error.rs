//! Error types for the completion service and capability orchestration layers.
//!
//! One taxonomy rule runs through the whole crate: infrastructure failures
//! (transport, unknown identifiers, bad state, quota rejections) are `AiError`
//! values propagated with `?`, while a tool that *ran* and failed on its own
//! logic reports that through [`crate::capability::ToolOutcome`] so fan-out
//! callers can continue past it.

use thiserror::Error;

/// Main error type for all switchboard operations.
#[derive(Error, Debug)]
pub enum AiError {
    /// Upstream API returned an error response.
    #[error("API error {code}: {message}")]
    ApiError {
        /// HTTP status code
        code: u16,
        /// Error message from the provider
        message: String,
        /// Optional raw error body
        details: Option<serde_json::Value>,
    },

    /// HTTP transport error (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// No registered provider declares the requested model id.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// A tool name that no connected client declares.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// A resource URI with no exact match on the owning client.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// Capability operation attempted outside the Connected state.
    #[error("client {0} is not connected")]
    NotConnected(String),

    /// No client that could serve the request is currently connected.
    #[error("no connected client for {0}")]
    NoConnectedClient(String),

    /// Pre-flight quota rejection. No upstream call was made and no cost
    /// was incurred.
    #[error("quota exceeded for {kind}: {used} of {ceiling}")]
    QuotaExceeded {
        /// Which ceiling was hit ("tokens" or "cost")
        kind: &'static str,
        /// Cumulative usage at pre-flight
        used: f64,
        /// Configured ceiling
        ceiling: f64,
    },

    /// Malformed or unexpected stream data that cannot be recovered from.
    #[error("stream error: {0}")]
    StreamError(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Coarse error category for presentation and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Upstream or network failure; the call may succeed on retry.
    Transport,
    /// Unknown model/tool/resource identifier.
    NotFound,
    /// Operation attempted in the wrong connection state.
    State,
    /// Quota ceiling reached; retrying will not help until the period rolls.
    Quota,
    /// Everything else.
    Other,
}

impl AiError {
    /// Convenience constructor for upstream API errors.
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Classify this error for callers deciding between "retry" and
    /// "upgrade/wait".
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ApiError { .. } | Self::HttpError(_) | Self::StreamError(_) => {
                ErrorCategory::Transport
            }
            Self::ModelNotFound(_) | Self::ToolNotFound(_) | Self::ResourceNotFound(_) => {
                ErrorCategory::NotFound
            }
            Self::NotConnected(_) | Self::NoConnectedClient(_) => ErrorCategory::State,
            Self::QuotaExceeded { .. } => ErrorCategory::Quota,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { code, .. } => *code == 429 || *code >= 500,
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            Self::StreamError(_) => true,
            _ => false,
        }
    }
}
