//! Normalized completion response types.

use serde::{Deserialize, Serialize};

use super::model::ProviderKind;

/// Reason why the model stopped generating tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

/// Token usage counters. Backends that omit counters report zeros rather
/// than failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Per-direction cost in USD for one completed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub total: f64,
}

impl CostBreakdown {
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// One response choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: super::chat::ChatMessage,
    pub finish_reason: FinishReason,
}

/// Normalized completion response shared by every adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    /// Model id that actually served the request
    pub model: String,
    pub provider: ProviderKind,
    pub choices: Vec<Choice>,
    pub usage: TokenUsage,
    pub cost: CostBreakdown,
}

impl CompletionResponse {
    /// Text of the first choice, if any.
    pub fn content_text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// One element of a completion stream: a text delta, with an optional usage
/// update when the backend reports counters mid-stream or at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    pub fn usage(usage: TokenUsage) -> Self {
        Self {
            text: String::new(),
            usage: Some(usage),
        }
    }
}
