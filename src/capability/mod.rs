//! Capability clients — tool/resource providers behind one uniform surface.
//!
//! Clients follow a connect/disconnect lifecycle and expose static tool and
//! resource lists loaded at connect time. Tool dispatch distinguishes two
//! failure shapes on purpose: an unknown tool name or a disconnected client
//! is an `AiError` (a precondition violation), while a known tool that fails
//! during its own execution returns a [`ToolOutcome`] with `success: false`
//! so fan-out callers can continue past it.

mod client;
mod generic;
mod store;
mod types;
mod workflow;

pub use client::CapabilityClient;
pub use generic::GenericClient;
pub use store::{StoreClient, StructuredStore};
pub use types::{
    CapabilityResource, CapabilityTool, ClientKind, ConnectionStatus, ToolOutcome,
};
pub use workflow::WorkflowClient;
