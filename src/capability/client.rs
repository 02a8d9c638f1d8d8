//! Capability client trait and the shared connection core.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AiError;

use super::types::{
    CapabilityResource, CapabilityTool, ClientKind, ConnectionStatus, ToolOutcome,
};

/// One capability provider behind the uniform surface.
///
/// Lifecycle: `Disconnected --connect--> Connected --disconnect--> Disconnected`;
/// a failed connect lands back in `Disconnected` with the error recorded. All
/// capability operations fail with [`AiError::NotConnected`] outside the
/// connected state. Re-invoking `connect` while connected resets the state.
#[async_trait]
pub trait CapabilityClient: Send + Sync {
    fn kind(&self) -> ClientKind;

    /// Establish transport, load the static tool and resource lists, and
    /// record the connected timestamp.
    async fn connect(&self, endpoint: &str) -> Result<(), AiError>;

    async fn disconnect(&self) -> Result<(), AiError>;

    async fn status(&self) -> ConnectionStatus;

    async fn list_tools(&self) -> Result<Vec<CapabilityTool>, AiError>;

    async fn list_resources(&self) -> Result<Vec<CapabilityResource>, AiError>;

    /// Execute a tool. An unknown name fails with [`AiError::ToolNotFound`];
    /// a known tool that fails during execution reports that inside the
    /// returned [`ToolOutcome`], never as an error.
    async fn call_tool(&self, name: &str, params: serde_json::Value)
    -> Result<ToolOutcome, AiError>;

    /// Read a resource by exact URI match.
    async fn read_resource(&self, uri: &str) -> Result<String, AiError>;

    /// Fire-and-forget subscription; delivery ordering is not guaranteed.
    async fn subscribe(&self, uri: &str) -> Result<(), AiError>;

    async fn unsubscribe(&self, uri: &str) -> Result<(), AiError>;
}

/// Shared connection state used by the concrete clients. Owns the status,
/// the static lists, and the subscription set behind one lock.
pub(crate) struct ClientCore {
    kind: ClientKind,
    state: RwLock<CoreState>,
}

#[derive(Default)]
struct CoreState {
    status: ConnectionStatus,
    endpoint: Option<String>,
    tools: Vec<CapabilityTool>,
    resources: Vec<CapabilityResource>,
    subscriptions: HashSet<String>,
}

impl ClientCore {
    pub fn new(kind: ClientKind) -> Self {
        Self {
            kind,
            state: RwLock::new(CoreState::default()),
        }
    }

    /// Mark connected and install the freshly loaded lists. Reconnecting
    /// replaces any previous state.
    pub async fn set_connected(
        &self,
        endpoint: &str,
        tools: Vec<CapabilityTool>,
        resources: Vec<CapabilityResource>,
    ) {
        let mut state = self.state.write().await;
        state.status = ConnectionStatus::connected_now();
        state.endpoint = Some(endpoint.to_string());
        state.tools = tools;
        state.resources = resources;
        state.subscriptions.clear();
    }

    pub async fn set_failed(&self, error: &AiError) {
        let mut state = self.state.write().await;
        state.status = ConnectionStatus::failed(error.to_string());
        state.tools.clear();
        state.resources.clear();
    }

    pub async fn set_disconnected(&self) {
        let mut state = self.state.write().await;
        state.status = ConnectionStatus::default();
        state.endpoint = None;
        state.tools.clear();
        state.resources.clear();
        state.subscriptions.clear();
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status.clone()
    }

    pub async fn ensure_connected(&self) -> Result<(), AiError> {
        if self.state.read().await.status.connected {
            Ok(())
        } else {
            Err(AiError::NotConnected(self.kind.to_string()))
        }
    }

    pub async fn tools(&self) -> Result<Vec<CapabilityTool>, AiError> {
        self.ensure_connected().await?;
        Ok(self.state.read().await.tools.clone())
    }

    pub async fn resources(&self) -> Result<Vec<CapabilityResource>, AiError> {
        self.ensure_connected().await?;
        Ok(self.state.read().await.resources.clone())
    }

    pub async fn declares_tool(&self, name: &str) -> bool {
        self.state.read().await.tools.iter().any(|t| t.name == name)
    }

    pub async fn find_resource(&self, uri: &str) -> Option<CapabilityResource> {
        self.state
            .read()
            .await
            .resources
            .iter()
            .find(|r| r.uri == uri)
            .cloned()
    }

    pub async fn subscribe(&self, uri: &str) -> Result<(), AiError> {
        self.ensure_connected().await?;
        self.state.write().await.subscriptions.insert(uri.to_string());
        Ok(())
    }

    pub async fn unsubscribe(&self, uri: &str) -> Result<(), AiError> {
        self.ensure_connected().await?;
        self.state.write().await.subscriptions.remove(uri);
        Ok(())
    }
}
