//! Generic capability client — the universal base tool set.
//!
//! Supplies the small tool set every deployment gets (`echo`, `text_stats`)
//! and a couple of informational resources. Domain clients load this set
//! first and append their own, so these tools are declared by every client
//! and are the only ones eligible for cross-client fallback.

use async_trait::async_trait;

use crate::error::AiError;

use super::client::{CapabilityClient, ClientCore};
use super::types::{
    CapabilityResource, CapabilityTool, ClientKind, ConnectionStatus, ToolOutcome,
};

/// The universal tool list. Shared with domain clients, which append to it.
pub(crate) fn base_tools() -> Vec<CapabilityTool> {
    vec![
        CapabilityTool::new(
            "echo",
            "Echo the input back, for connectivity checks",
            serde_json::json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }),
        ),
        CapabilityTool::new(
            "text_stats",
            "Word, line, and character counts for a text",
            serde_json::json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        ),
    ]
}

pub(crate) fn base_resources() -> Vec<CapabilityResource> {
    vec![
        CapabilityResource::new(
            "generic://info/about",
            "About",
            "Description of the generic capability surface",
        )
        .with_mime_type("text/plain"),
    ]
}

/// Dispatch for the universal tools. Domain clients fall through to this for
/// names outside their own set.
pub(crate) fn dispatch_base_tool(name: &str, params: &serde_json::Value) -> Option<ToolOutcome> {
    match name {
        "echo" => Some(match params.get("message").and_then(|m| m.as_str()) {
            Some(message) => ToolOutcome::ok(serde_json::json!({ "message": message })),
            None => ToolOutcome::failed("missing required parameter: message"),
        }),
        "text_stats" => Some(match params.get("text").and_then(|t| t.as_str()) {
            Some(text) => ToolOutcome::ok(serde_json::json!({
                "characters": text.chars().count(),
                "words": text.split_whitespace().count(),
                "lines": text.lines().count(),
            })),
            None => ToolOutcome::failed("missing required parameter: text"),
        }),
        _ => None,
    }
}

pub(crate) fn read_base_resource(uri: &str) -> Option<String> {
    match uri {
        "generic://info/about" => Some(
            "Generic capability client: echo and text statistics tools.".to_string(),
        ),
        _ => None,
    }
}

/// Base capability client with only the universal tool set.
pub struct GenericClient {
    core: ClientCore,
}

impl GenericClient {
    pub fn new() -> Self {
        Self {
            core: ClientCore::new(ClientKind::Generic),
        }
    }
}

impl Default for GenericClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityClient for GenericClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Generic
    }

    async fn connect(&self, endpoint: &str) -> Result<(), AiError> {
        self.core
            .set_connected(endpoint, base_tools(), base_resources())
            .await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AiError> {
        self.core.set_disconnected().await;
        Ok(())
    }

    async fn status(&self) -> ConnectionStatus {
        self.core.status().await
    }

    async fn list_tools(&self) -> Result<Vec<CapabilityTool>, AiError> {
        self.core.tools().await
    }

    async fn list_resources(&self) -> Result<Vec<CapabilityResource>, AiError> {
        self.core.resources().await
    }

    async fn call_tool(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<ToolOutcome, AiError> {
        self.core.ensure_connected().await?;
        if !self.core.declares_tool(name).await {
            return Err(AiError::ToolNotFound(name.to_string()));
        }
        let outcome = dispatch_base_tool(name, &params)
            .unwrap_or_else(|| ToolOutcome::failed(format!("no handler for tool {name}")));
        Ok(outcome.with_metadata("client", serde_json::json!("generic")))
    }

    async fn read_resource(&self, uri: &str) -> Result<String, AiError> {
        self.core.ensure_connected().await?;
        if self.core.find_resource(uri).await.is_none() {
            return Err(AiError::ResourceNotFound(uri.to_string()));
        }
        read_base_resource(uri).ok_or_else(|| AiError::ResourceNotFound(uri.to_string()))
    }

    async fn subscribe(&self, uri: &str) -> Result<(), AiError> {
        self.core.subscribe(uri).await
    }

    async fn unsubscribe(&self, uri: &str) -> Result<(), AiError> {
        self.core.unsubscribe(uri).await
    }
}
