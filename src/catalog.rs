//! Model catalog — static per-provider tables of known models with token
//! limits, pricing, and capability tags.
//!
//! Each provider owns one builtin table, defined once at construction. Cost
//! lookups against an unknown model return a zero rate instead of failing so
//! metering never aborts a call that already completed.

use crate::types::{ModelCapability, ModelDescriptor, ProviderKind};

/// Catalog of models one provider declares.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    provider: ProviderKind,
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(provider: ProviderKind, models: Vec<ModelDescriptor>) -> Self {
        Self { provider, models }
    }

    pub fn provider(&self) -> &ProviderKind {
        &self.provider
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Find a model by its public id.
    pub fn find(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == model_id)
    }

    pub fn declares(&self, model_id: &str) -> bool {
        self.find(model_id).is_some()
    }

    /// Cost rate per 1k tokens for one direction; 0.0 for unknown models.
    pub fn rate(&self, model_id: &str, is_input: bool) -> f64 {
        self.find(model_id).map(|m| m.rate(is_input)).unwrap_or(0.0)
    }

    /// Builtin OpenAI-backend table.
    pub fn openai() -> Self {
        Self::new(
            ProviderKind::OpenAi,
            vec![
                chat_model(
                    "gpt-4o",
                    ProviderKind::OpenAi,
                    "gpt-4o",
                    16_384,
                    128_000,
                    0.0025,
                    0.01,
                ),
                chat_model(
                    "gpt-4o-mini",
                    ProviderKind::OpenAi,
                    "gpt-4o-mini",
                    16_384,
                    128_000,
                    0.000_15,
                    0.000_6,
                ),
                chat_model(
                    "gpt-4-turbo",
                    ProviderKind::OpenAi,
                    "gpt-4-turbo",
                    4_096,
                    128_000,
                    0.01,
                    0.03,
                ),
            ],
        )
    }

    /// Builtin Anthropic-backend table.
    pub fn anthropic() -> Self {
        Self::new(
            ProviderKind::Anthropic,
            vec![
                chat_model(
                    "claude-sonnet",
                    ProviderKind::Anthropic,
                    "claude-3-5-sonnet-latest",
                    8_192,
                    200_000,
                    0.003,
                    0.015,
                ),
                chat_model(
                    "claude-haiku",
                    ProviderKind::Anthropic,
                    "claude-3-5-haiku-latest",
                    8_192,
                    200_000,
                    0.000_8,
                    0.004,
                ),
            ],
        )
    }

    /// Builtin local-model table. Local inference is free; rates are zero.
    pub fn ollama() -> Self {
        Self::new(
            ProviderKind::Ollama,
            vec![
                chat_model(
                    "llama3.2",
                    ProviderKind::Ollama,
                    "llama3.2",
                    4_096,
                    128_000,
                    0.0,
                    0.0,
                ),
                chat_model(
                    "mistral",
                    ProviderKind::Ollama,
                    "mistral",
                    4_096,
                    32_000,
                    0.0,
                    0.0,
                ),
            ],
        )
    }
}

fn chat_model(
    id: &str,
    provider: ProviderKind,
    upstream_name: &str,
    max_tokens: u32,
    context_window: u32,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        provider,
        upstream_name: upstream_name.to_string(),
        max_tokens,
        context_window,
        input_cost_per_1k,
        output_cost_per_1k,
        capabilities: vec![
            ModelCapability::Chat,
            ModelCapability::Streaming,
            ModelCapability::Tools,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        let catalog = ModelCatalog::openai();
        assert!(catalog.declares("gpt-4o"));
        assert!(!catalog.declares("claude-sonnet"));
        assert_eq!(catalog.find("gpt-4o").unwrap().upstream_name, "gpt-4o");
    }

    #[test]
    fn unknown_model_rate_is_zero() {
        let catalog = ModelCatalog::anthropic();
        assert_eq!(catalog.rate("no-such-model", true), 0.0);
        assert_eq!(catalog.rate("no-such-model", false), 0.0);
        assert!(catalog.rate("claude-sonnet", false) > 0.0);
    }
}
