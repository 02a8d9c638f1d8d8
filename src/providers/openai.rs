//! OpenAI-shaped completion adapter.
//!
//! Wire contract: message array in, usage block inline with the response.
//! Streaming is SSE with a `[DONE]` sentinel; chunks that fail to parse are
//! skipped rather than aborting the stream, and a final chunk may carry the
//! usage counters.

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

/// Adapter for OpenAI-compatible chat completion endpoints.
pub struct OpenAiAdapter {
    config: AdapterConfig,
    http_client: reqwest::Client,
    catalog: ModelCatalog,
}

impl OpenAiAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AiError> {
        let http_client = build_http_client(&config)?;
        Ok(Self {
            config,
            http_client,
            catalog: ModelCatalog::openai(),
        })
    }

    /// Replace the builtin model table (for gateways serving custom ids).
    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> WireRequest {
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
                    role: role_name(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            max_tokens: request.params.max_tokens,
            stop: request.params.stop.clone(),
            stream,
            user: Some(request.user_id.clone()),
        }
    }

    async fn send(&self, body: &WireRequest) -> Result<reqwest::Response, AiError> {
        let mut req = self.http_client.post(self.chat_url()).json(body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        Ok(response)
    }

    /// Normalize the raw wire response into the shared shape, pricing usage
    /// against this adapter's catalog.
    fn normalize(&self, raw: WireResponse, model_id: &str) -> CompletionResponse {
        let usage = raw
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            })
            .unwrap_or_default();
        let cost = CostBreakdown::new(
            self.calculate_cost(usage.prompt_tokens, model_id, true),
            self.calculate_cost(usage.completion_tokens, model_id, false),
        );
        CompletionResponse {
            id: raw.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            model: model_id.to_string(),
            provider: ProviderKind::OpenAi,
            choices: raw
                .choices
                .into_iter()
                .enumerate()
                .map(|(i, c)| Choice {
                    index: c.index.unwrap_or(i as u32),
                    message: ChatMessage {
                        role: MessageRole::Assistant,
                        content: c.message.map(|m| m.content).unwrap_or_default(),
                    },
                    finish_reason: finish_reason(c.finish_reason.as_deref()),
                })
                .collect(),
            usage,
            cost,
        }
    }
}

#[async_trait]
impl CompletionAdapter for OpenAiAdapter {
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
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| AiError::StreamError(e.to_string()))?;
                if event.data.trim() == "[DONE]" {
                    break;
                }
                // Partial or malformed chunks are skipped, not fatal.
                let chunk = match serde_json::from_str::<WireStreamChunk>(&event.data) {
                    Ok(chunk) => chunk,
                    Err(_) => {
                        tracing::debug!(
                            target: "switchboard::openai",
                            "skipping unparseable stream chunk"
                        );
                        continue;
                    }
                };
                if let Some(usage) = chunk.usage {
                    yield StreamDelta::usage(TokenUsage {
                        prompt_tokens: usage.prompt_tokens.unwrap_or(0),
                        completion_tokens: usage.completion_tokens.unwrap_or(0),
                        total_tokens: usage.total_tokens.unwrap_or(0),
                    });
                }
                for choice in chunk.choices {
                    if let Some(text) = choice.delta.and_then(|d| d.content) {
                        if !text.is_empty() {
                            yield StreamDelta::text(text);
                        }
                    }
                }
            }
            // `events` (and the HTTP connection under it) is dropped here or
            // whenever the consumer stops pulling.
        };
        Ok(Box::pin(stream))
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    index: Option<u32>,
    message: Option<WireMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: Option<WireDelta>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    content: Option<String>,
}
