//! Anthropic-shaped completion adapter.
//!
//! Wire contract: content-block array with the system prompt lifted out of
//! the message list, assistant role remapped back on normalization. Usage
//! counters (`input_tokens`/`output_tokens`) may be omitted entirely and
//! default to zero rather than failing. Streaming is typed SSE events
//! (`content_block_delta` carries text, `message_delta` the final usage).

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{AdapterConfig, build_http_client, error_for_response};
use crate::catalog::ModelCatalog;
use crate::error::AiError;
use crate::traits::{CompletionAdapter, CompletionStream};
use crate::types::{
    ChatMessage, Choice, CompletionRequest, CompletionResponse, CostBreakdown, FinishReason,
    MessageRole, ProviderKind, StreamDelta, TokenUsage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for Anthropic messages endpoints.
pub struct AnthropicAdapter {
    config: AdapterConfig,
    http_client: reqwest::Client,
    catalog: ModelCatalog,
}

impl AnthropicAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AiError> {
        let http_client = build_http_client(&config)?;
        Ok(Self {
            config,
            http_client,
            catalog: ModelCatalog::anthropic(),
        })
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> WireRequest {
        let upstream = self
            .catalog
            .find(&request.model)
            .map(|m| m.upstream_name.clone())
            .unwrap_or_else(|| request.model.clone());
        let max_tokens = request.params.max_tokens.unwrap_or_else(|| {
            self.catalog
                .find(&request.model)
                .map(|m| m.max_tokens)
                .unwrap_or(4096)
        });
        let (system, messages) = request.split_system();
        WireRequest {
            model: upstream,
            system,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        MessageRole::Assistant => "assistant",
                        _ => "user",
                    }
                    .to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            stop_sequences: request.params.stop.clone(),
            stream,
        }
    }

    async fn send(&self, body: &WireRequest) -> Result<reqwest::Response, AiError> {
        let mut req = self
            .http_client
            .post(self.messages_url())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body);
        if let Some(key) = &self.config.api_key {
            req = req.header("x-api-key", key.expose_secret());
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        Ok(response)
    }

    fn normalize(&self, raw: WireResponse, model_id: &str) -> CompletionResponse {
        // Usage may be absent or partial; zero is the contract, not an error.
        let usage = raw
            .usage
            .map(|u| TokenUsage::new(u.input_tokens.unwrap_or(0), u.output_tokens.unwrap_or(0)))
            .unwrap_or_default();
        let cost = CostBreakdown::new(
            self.calculate_cost(usage.prompt_tokens, model_id, true),
            self.calculate_cost(usage.completion_tokens, model_id, false),
        );
        let text = raw
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        CompletionResponse {
            id: raw.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            model: model_id.to_string(),
            provider: ProviderKind::Anthropic,
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: MessageRole::Assistant,
                    content: text,
                },
                finish_reason: finish_reason(raw.stop_reason.as_deref()),
            }],
            usage,
            cost,
        }
    }
}

#[async_trait]
impl CompletionAdapter for AnthropicAdapter {
    fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiError> {
        let body = self.build_body(request, false);
        let response = self.send(&body).await?;
        let raw: WireResponse = response.json().await?;
        Ok(self.normalize(raw, &request.model))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, AiError> {
        use eventsource_stream::Eventsource;

        let body = self.build_body(request, true);
        let response = self.send(&body).await?;
        let mut events = response.bytes_stream().eventsource();

        let stream = try_stream! {
            let mut input_tokens: u32 = 0;
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| AiError::StreamError(e.to_string()))?;
                let parsed = match serde_json::from_str::<WireStreamEvent>(&event.data) {
                    Ok(parsed) => parsed,
                    Err(_) => continue,
                };
                match parsed {
                    WireStreamEvent::MessageStart { message } => {
                        if let Some(u) = message.and_then(|m| m.usage) {
                            input_tokens = u.input_tokens.unwrap_or(0);
                        }
                    }
                    WireStreamEvent::ContentBlockDelta { delta } => {
                        if let Some(text) = delta.and_then(|d| d.text) {
                            if !text.is_empty() {
                                yield StreamDelta::text(text);
                            }
                        }
                    }
                    WireStreamEvent::MessageDelta { usage } => {
                        let output = usage.and_then(|u| u.output_tokens).unwrap_or(0);
                        yield StreamDelta::usage(TokenUsage::new(input_tokens, output));
                    }
                    WireStreamEvent::MessageStop => break,
                    WireStreamEvent::Other => {}
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

fn finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Unknown,
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: Option<String>,
    #[serde(default)]
    content: Vec<WireContentBlock>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireStreamEvent {
    MessageStart {
        message: Option<WireStreamMessage>,
    },
    ContentBlockDelta {
        delta: Option<WireStreamDelta>,
    },
    MessageDelta {
        usage: Option<WireUsage>,
    },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireStreamMessage {
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamDelta {
    text: Option<String>,
}
