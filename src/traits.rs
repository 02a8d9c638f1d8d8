//! Core adapter trait for completion backends.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::catalog::ModelCatalog;
use crate::error::AiError;
use crate::types::{CompletionRequest, CompletionResponse, StreamDelta};

/// Lazy, non-restartable sequence of stream deltas. Dropping the stream
/// releases the underlying transport on every exit path: normal completion,
/// consumer-initiated early stop, or upstream error.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, AiError>> + Send>>;

/// One upstream completion backend: translates a normalized request to the
/// backend's wire shape and normalizes the response or stream back.
#[async_trait]
pub trait CompletionAdapter: Send + Sync {
    /// The static model table this adapter serves.
    fn catalog(&self) -> &ModelCatalog;

    /// Execute a full completion. Transport failures surface as
    /// [`AiError::ApiError`]/[`AiError::HttpError`] and propagate to the
    /// caller; the service layer appends a failed usage record first.
    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiError>;

    /// Execute a streaming completion, yielding text deltas as they arrive.
    /// Backends without chunked output may degrade to awaiting the full
    /// response and yielding it once.
    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, AiError>;

    /// Cost in USD for `tokens` against `model_id` in one direction.
    /// Returns 0.0 for models this adapter does not recognize.
    fn calculate_cost(&self, tokens: u32, model_id: &str, is_input: bool) -> f64 {
        f64::from(tokens) / 1000.0 * self.catalog().rate(model_id, is_input)
    }
}
