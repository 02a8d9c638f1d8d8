//! Local-model completion adapter (Ollama-shaped `/api/chat`).
//!
//! Wire contract: message array in, usage reported as `prompt_eval_count` /
//! `eval_count`. The backend gives no per-call token granularity guarantee
//! for chunked output, so [`CompletionAdapter::stream`] degrades to awaiting
//! the full response and yielding it once.

use async_stream::try_stream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AdapterConfig, build_http_client, error_for_response};
use crate::catalog::ModelCatalog;
use crate::error::AiError;
use crate::traits::{CompletionAdapter, CompletionStream};
use crate::types::{
    ChatMessage, Choice, CompletionRequest, CompletionResponse, CostBreakdown, FinishReason,
    MessageRole, ProviderKind, StreamDelta, TokenUsage,
};

/// Adapter for a local Ollama server.
pub struct OllamaAdapter {
    config: AdapterConfig,
    http_client: reqwest::Client,
    catalog: ModelCatalog,
}

impl OllamaAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AiError> {
        let http_client = build_http_client(&config)?;
        Ok(Self {
            config,
            http_client,
            catalog: ModelCatalog::ollama(),
        })
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &CompletionRequest) -> WireRequest {
        let upstream = self
            .catalog
            .find(&request.model)
            .map(|m| m.upstream_name.clone())
            .unwrap_or_else(|| request.model.clone());
        WireRequest {
            model: upstream,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        MessageRole::System => "system",
                        MessageRole::Assistant => "assistant",
                        _ => "user",
                    }
                    .to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            // Chunked output carries no reliable per-chunk counters; always
            // request the single-shot form.
            stream: false,
            options: WireOptions {
                temperature: request.params.temperature,
                top_p: request.params.top_p,
                num_predict: request.params.max_tokens,
            },
        }
    }

    fn normalize(&self, raw: WireResponse, model_id: &str) -> CompletionResponse {
        let usage = TokenUsage::new(
            raw.prompt_eval_count.unwrap_or(0),
            raw.eval_count.unwrap_or(0),
        );
        let cost = CostBreakdown::new(
            self.calculate_cost(usage.prompt_tokens, model_id, true),
            self.calculate_cost(usage.completion_tokens, model_id, false),
        );
        CompletionResponse {
            id: uuid::Uuid::new_v4().to_string(),
            model: model_id.to_string(),
            provider: ProviderKind::Ollama,
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: MessageRole::Assistant,
                    content: raw.message.map(|m| m.content).unwrap_or_default(),
                },
                finish_reason: if raw.done.unwrap_or(true) {
                    FinishReason::Stop
                } else {
                    FinishReason::Unknown
                },
            }],
            usage,
            cost,
        }
    }
}

#[async_trait]
impl CompletionAdapter for OllamaAdapter {
    fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiError> {
        let body = self.build_body(request);
        let response = self.http_client.post(self.chat_url()).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let raw: WireResponse = response.json().await?;
        Ok(self.normalize(raw, &request.model))
    }

    /// Degraded streaming: await the full completion, then yield its text
    /// once followed by the usage counters.
    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, AiError> {
        let response = self.generate(request).await?;
        let stream = try_stream! {
            if let Some(text) = response.content_text() {
                yield StreamDelta::text(text.to_string());
            }
            yield StreamDelta::usage(response.usage);
        };
        Ok(Box::pin(stream))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    options: WireOptions,
}

#[derive(Debug, Serialize)]
struct WireOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    message: Option<WireMessage>,
    done: Option<bool>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn adapter() -> OllamaAdapter {
        OllamaAdapter::new(AdapterConfig::new("http://localhost:1")).unwrap()
    }

    #[test]
    fn alternate_usage_fields_map_to_counters() {
        let raw: WireResponse = serde_json::from_value(serde_json::json!({
            "message": {"role": "assistant", "content": "pong"},
            "done": true,
            "prompt_eval_count": 12,
            "eval_count": 34
        }))
        .unwrap();
        let response = adapter().normalize(raw, "llama3.2");
        assert_eq!(response.usage.prompt_tokens, 12);
        assert_eq!(response.usage.completion_tokens, 34);
        assert_eq!(response.usage.total_tokens, 46);
        // Local models are free.
        assert_eq!(response.cost.total, 0.0);
    }

    #[tokio::test]
    async fn degraded_stream_yields_once() {
        // Build the degraded stream directly from a normalized response.
        let raw: WireResponse = serde_json::from_value(serde_json::json!({
            "message": {"role": "assistant", "content": "full text"},
            "done": true,
            "prompt_eval_count": 5,
            "eval_count": 7
        }))
        .unwrap();
        let response = adapter().normalize(raw, "llama3.2");
        let stream = try_stream! {
            if let Some(text) = response.content_text() {
                yield StreamDelta::text(text.to_string());
            }
            yield StreamDelta::usage(response.usage);
        };
        let deltas: Vec<Result<StreamDelta, AiError>> =
            Box::pin(stream).collect::<Vec<_>>().await;
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].as_ref().unwrap().text, "full text");
        assert_eq!(
            deltas[1].as_ref().unwrap().usage.unwrap().total_tokens,
            12
        );
    }
}
