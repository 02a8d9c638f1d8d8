//! Completion request types: messages, sampling parameters, and tool schemas.

use serde::{Deserialize, Serialize};

/// Role tag for a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One role-tagged message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters forwarded to the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Function-style tool schema passed through to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool input
    pub input_schema: serde_json::Value,
}

/// Normalized completion request. Adapters translate this into their
/// backend's wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Catalog model id (resolved to an upstream name by the adapter)
    pub model: String,
    /// Ordered conversation messages
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub params: SamplingParams,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    /// Caller identity used for metering and quota
    pub user_id: String,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Minimal request with one user message.
    pub fn new(model: impl Into<String>, user_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            params: SamplingParams::default(),
            tools: Vec::new(),
            user_id: user_id.into(),
            stream: false,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Messages with the system prompt split off, for backends that carry it
    /// as a separate top-level field.
    pub fn split_system(&self) -> (Option<String>, Vec<&ChatMessage>) {
        let system = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.clone())
            .collect::<Vec<_>>();
        let rest = self
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .collect();
        let system = if system.is_empty() {
            None
        } else {
            Some(system.join("\n"))
        };
        (system, rest)
    }
}
