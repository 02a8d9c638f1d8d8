//! # Switchboard - Multi-Provider AI Orchestration
//!
//! Switchboard is a library for routing AI completion calls across multiple
//! upstream providers behind one typed interface, with quota enforcement and
//! usage metering, plus a capability layer that multiplexes tool and resource
//! providers behind a single orchestrating facade.
//!
#![deny(unsafe_code)]

//! ## Features
//!
//! - **Provider Abstraction**: One [`CompletionAdapter`] trait with adapters
//!   for three upstream wire shapes, each normalized into a shared
//!   [`CompletionResponse`].
//! - **Model Catalog**: Static per-provider model tables with pricing; cost is
//!   computed from catalog rates, and unknown models price at zero.
//! - **Quota + Metering**: Pre-flight quota checks against an append-only
//!   usage ledger; every call, failed or not, leaves an audit record.
//! - **Streaming**: Cancellable completion streams; dropping the consumer
//!   releases the upstream transport.
//! - **Capability Clients**: Connect/disconnect lifecycle, static tool and
//!   resource lists, and the tool envelope contract where business failures
//!   are values and infrastructure failures are errors.
//! - **Orchestration**: Fan-out connection management, declared-capability
//!   tool routing, scheme-based resource routing, and health aggregation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard::{
//!     AdapterConfig, AiService, CompletionRequest, MemoryLedger, OpenAiAdapter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = OpenAiAdapter::new(
//!         AdapterConfig::new("https://api.openai.com/v1").with_api_key("your-api-key"),
//!     )?;
//!     let service = AiService::new(Arc::new(MemoryLedger::new()))
//!         .with_adapter(Arc::new(adapter));
//!
//!     let request = CompletionRequest::new("gpt-4o-mini", "user-1", "Hello, world!");
//!     let response = service.generate(request).await?;
//!     if let Some(text) = response.content_text() {
//!         println!("{text}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod capability;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod providers;
pub mod quota;
pub mod service;
pub mod traits;
pub mod types;

pub use capability::{
    CapabilityClient, CapabilityResource, CapabilityTool, ClientKind, ConnectionStatus,
    GenericClient, StoreClient, StructuredStore, ToolOutcome, WorkflowClient,
};
pub use catalog::ModelCatalog;
pub use error::{AiError, ErrorCategory};
pub use ledger::{CallStatus, MemoryLedger, UsageLedger, UsageQuery, UsageRecord};
pub use orchestrator::{
    HealthReport, HealthState, Orchestrator, OrchestratorConfig, TaggedResource, TaggedTool,
};
pub use providers::{AdapterConfig, AnthropicAdapter, OllamaAdapter, OpenAiAdapter};
pub use quota::{QuotaFailureMode, QuotaInfo, QuotaPolicy, Timeframe, UsageAggregate, UsageStats};
pub use service::AiService;
pub use traits::{CompletionAdapter, CompletionStream};
pub use types::{
    ChatMessage, Choice, CompletionRequest, CompletionResponse, CostBreakdown, FinishReason,
    MessageRole, ModelCapability, ModelDescriptor, ProviderKind, SamplingParams, StreamDelta,
    TokenUsage, ToolSpec,
};
