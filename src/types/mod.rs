//! Core data types shared across providers, the completion service, and the
//! capability layer.

mod chat;
mod model;
mod response;

pub use chat::{ChatMessage, CompletionRequest, MessageRole, SamplingParams, ToolSpec};
pub use model::{ModelCapability, ModelDescriptor, ProviderKind};
pub use response::{
    Choice, CompletionResponse, CostBreakdown, FinishReason, StreamDelta, TokenUsage,
};
