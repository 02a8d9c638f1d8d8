//! Model descriptors and provider identification.

use serde::{Deserialize, Serialize};

/// Provider backend kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Ollama,
    Custom(String),
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Ollama => write!(f, "ollama"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl ProviderKind {
    /// Construct from a provider name string. Known names map to concrete
    /// variants; others map to `Custom(name)`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "openai" => Self::OpenAi,
            "anthropic" => Self::Anthropic,
            "ollama" => Self::Ollama,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Capability tags a model may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelCapability {
    Chat,
    Streaming,
    Tools,
    Vision,
    Reasoning,
}

/// Static description of one model, defined at provider construction and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Public model id callers use (may differ from the upstream name)
    pub id: String,
    /// Owning provider
    pub provider: ProviderKind,
    /// Model name sent on the wire
    pub upstream_name: String,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Context window size in tokens
    pub context_window: u32,
    /// Cost in USD per 1k input tokens
    pub input_cost_per_1k: f64,
    /// Cost in USD per 1k output tokens
    pub output_cost_per_1k: f64,
    /// Declared capabilities
    pub capabilities: Vec<ModelCapability>,
}

impl ModelDescriptor {
    /// Cost rate for one direction.
    pub fn rate(&self, is_input: bool) -> f64 {
        if is_input {
            self.input_cost_per_1k
        } else {
            self.output_cost_per_1k
        }
    }

    pub fn supports(&self, cap: ModelCapability) -> bool {
        self.capabilities.contains(&cap)
    }
}
