//! Orchestrator — the multi-client capability facade.
//!
//! Holds the client registry and multiplexes tool and resource operations
//! across it. Connection management is fan-out/settle-all: every client is
//! driven independently and one failure never aborts the others. Tool routing
//! goes through a declared-capability map built from each client's own
//! `list_tools()` at connect time; a small keyword preference survives only as
//! a tie-break between multiple declaring clients. Resource routing is by URI
//! scheme with no fallback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;

use crate::capability::{
    CapabilityClient, CapabilityResource, CapabilityTool, ClientKind, ConnectionStatus,
    ToolOutcome,
};
use crate::error::AiError;

const LOG_TARGET: &str = "switchboard::orchestrator";

/// Registry configuration, supplied once at construction. Reconfiguration
/// tears the registry down and rebuilds it.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Client kinds allowed into the registry
    pub enabled_clients: Vec<ClientKind>,
    /// Routing target when no declaring client is preferred
    pub default_client: ClientKind,
    /// Connect registered clients immediately at registration
    pub auto_connect: bool,
    /// Upper bound on a single client connect
    pub connect_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled_clients: vec![ClientKind::Generic, ClientKind::Store, ClientKind::Workflow],
            default_client: ClientKind::Generic,
            auto_connect: false,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Overall registry health, aggregated from per-client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Every registered client is connected
    Healthy,
    /// Some registered clients are connected
    Degraded,
    /// No registered client is connected
    Unhealthy,
}

/// Snapshot returned by [`Orchestrator::health_check`].
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub state: HealthState,
    pub clients: HashMap<ClientKind, ConnectionStatus>,
}

/// A tool tagged with the client that declared it.
#[derive(Debug, Clone)]
pub struct TaggedTool {
    pub client: ClientKind,
    pub tool: CapabilityTool,
}

/// A resource tagged with the client that exposes it.
#[derive(Debug, Clone)]
pub struct TaggedResource {
    pub client: ClientKind,
    pub resource: CapabilityResource,
}

struct Slot {
    client: Arc<dyn CapabilityClient>,
    endpoint: String,
}

/// Multiplexes capability clients behind one facade.
pub struct Orchestrator {
    config: RwLock<OrchestratorConfig>,
    slots: RwLock<HashMap<ClientKind, Slot>>,
    /// tool name -> kinds that declared it, rebuilt after each connect
    tool_map: RwLock<HashMap<String, Vec<ClientKind>>>,
    /// URI scheme -> owning kind, learned from declared resources
    scheme_map: RwLock<HashMap<String, ClientKind>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config: RwLock::new(config),
            slots: RwLock::new(HashMap::new()),
            tool_map: RwLock::new(HashMap::new()),
            scheme_map: RwLock::new(HashMap::new()),
        }
    }

    /// Add a client to the registry under its own kind. Rejected if the kind
    /// is not in the enabled set. Connects immediately when the configuration
    /// asks for `auto_connect`.
    pub async fn register(
        &self,
        client: Arc<dyn CapabilityClient>,
        endpoint: impl Into<String>,
    ) -> Result<(), AiError> {
        let kind = client.kind();
        let auto_connect = {
            let config = self.config.read().await;
            if !config.enabled_clients.contains(&kind) {
                return Err(AiError::ConfigurationError(format!(
                    "client kind {kind} is not enabled"
                )));
            }
            config.auto_connect
        };
        self.slots.write().await.insert(
            kind,
            Slot {
                client,
                endpoint: endpoint.into(),
            },
        );
        if auto_connect {
            // Best effort, mirroring connect_all: the failure is recorded in
            // the client's own status.
            if let Err(e) = self.connect_client(kind).await {
                tracing::warn!(target: LOG_TARGET, client = %kind, error = %e, "auto-connect failed");
            }
        }
        Ok(())
    }

    /// Connect every registered client concurrently. One failure never aborts
    /// the others; each outcome lands in its own map entry and in the
    /// client's recorded status.
    pub async fn connect_all(&self) -> HashMap<ClientKind, Result<(), AiError>> {
        let timeout = self.config.read().await.connect_timeout;
        let targets: Vec<(ClientKind, Arc<dyn CapabilityClient>, String)> = {
            let slots = self.slots.read().await;
            slots
                .iter()
                .map(|(kind, slot)| (*kind, Arc::clone(&slot.client), slot.endpoint.clone()))
                .collect()
        };
        let futures = targets.into_iter().map(|(kind, client, endpoint)| async move {
            let result = Self::connect_with_timeout(&*client, &endpoint, timeout).await;
            if let Err(e) = &result {
                tracing::warn!(target: LOG_TARGET, client = %kind, error = %e, "connect failed");
            }
            (kind, result)
        });
        let outcomes: HashMap<ClientKind, Result<(), AiError>> =
            join_all(futures).await.into_iter().collect();
        self.rebuild_routing_maps().await;
        outcomes
    }

    /// Connect one registered client.
    pub async fn connect_client(&self, kind: ClientKind) -> Result<(), AiError> {
        let (client, endpoint) = self.slot(kind).await?;
        let timeout = self.config.read().await.connect_timeout;
        let result = Self::connect_with_timeout(&*client, &endpoint, timeout).await;
        self.rebuild_routing_maps().await;
        result
    }

    pub async fn disconnect_client(&self, kind: ClientKind) -> Result<(), AiError> {
        let (client, _) = self.slot(kind).await?;
        let result = client.disconnect().await;
        self.rebuild_routing_maps().await;
        result
    }

    /// Disconnect every registered client, best effort.
    pub async fn disconnect_all(&self) {
        let clients: Vec<(ClientKind, Arc<dyn CapabilityClient>)> = {
            let slots = self.slots.read().await;
            slots
                .iter()
                .map(|(kind, slot)| (*kind, Arc::clone(&slot.client)))
                .collect()
        };
        let futures = clients.into_iter().map(|(kind, client)| async move {
            if let Err(e) = client.disconnect().await {
                tracing::warn!(target: LOG_TARGET, client = %kind, error = %e, "disconnect failed");
            }
        });
        join_all(futures).await;
        self.rebuild_routing_maps().await;
    }

    /// Tools from every connected client, each tagged with its origin. A
    /// client whose listing fails is logged and excluded; the rest still
    /// come back.
    pub async fn get_all_tools(&self) -> Vec<TaggedTool> {
        let clients = self.connected_clients().await;
        let futures = clients.into_iter().map(|(kind, client)| async move {
            match client.list_tools().await {
                Ok(tools) => tools
                    .into_iter()
                    .map(|tool| TaggedTool { client: kind, tool })
                    .collect(),
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, client = %kind, error = %e, "tool listing failed");
                    Vec::new()
                }
            }
        });
        let mut seen: Vec<(String, ClientKind)> = Vec::new();
        let mut out = Vec::new();
        for tagged in join_all(futures).await.into_iter().flatten() {
            let key = (tagged.tool.name.clone(), tagged.client);
            if !seen.contains(&key) {
                seen.push(key);
                out.push(tagged);
            }
        }
        out
    }

    /// Resources from every connected client, tagged with their origin.
    /// Partial results on individual listing failures.
    pub async fn get_all_resources(&self) -> Vec<TaggedResource> {
        let clients = self.connected_clients().await;
        let futures = clients.into_iter().map(|(kind, client)| async move {
            match client.list_resources().await {
                Ok(resources) => resources
                    .into_iter()
                    .map(|resource| TaggedResource {
                        client: kind,
                        resource,
                    })
                    .collect(),
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, client = %kind, error = %e, "resource listing failed");
                    Vec::new()
                }
            }
        });
        let mut seen: Vec<(String, ClientKind)> = Vec::new();
        let mut out = Vec::new();
        for tagged in join_all(futures).await.into_iter().flatten() {
            let key = (tagged.resource.uri.clone(), tagged.client);
            if !seen.contains(&key) {
                seen.push(key);
                out.push(tagged);
            }
        }
        out
    }

    /// Route a tool call through the declared-capability map.
    ///
    /// The declaring clients come from the map; among them the keyword
    /// preference breaks ties, then the configured default client, then any
    /// connected declaring client. When the preferred client is disconnected,
    /// another declaring client is tried only for tools declared universally
    /// (by every registered client); domain tools fail with
    /// [`AiError::NoConnectedClient`] instead.
    ///
    /// A name missing from the map is classified by keyword (default client
    /// otherwise): when the classified client is registered but disconnected
    /// the failure is [`AiError::NoConnectedClient`], since the tool may well
    /// exist behind a connection that is down. Only a name whose classified
    /// client is connected and still does not declare it is
    /// [`AiError::ToolNotFound`].
    pub async fn execute_tool(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<ToolOutcome, AiError> {
        let declaring = match self.tool_map.read().await.get(name).cloned() {
            Some(declaring) => declaring,
            None => return Err(self.undeclared_tool_error(name).await),
        };
        let registered_count = self.slots.read().await.len();
        let connected: Vec<ClientKind> = {
            let mut kinds = Vec::new();
            for (kind, client) in self.connected_clients().await {
                if declaring.contains(&kind) {
                    kinds.push(client.kind());
                }
            }
            kinds
        };
        let default_client = self.config.read().await.default_client;

        let chosen = match keyword_preference(name).filter(|k| declaring.contains(k)) {
            Some(preferred) if connected.contains(&preferred) => preferred,
            Some(_) => {
                // Preferred declaring client is down. Universal tools may run
                // anywhere; domain tools may not.
                let universal = declaring.len() == registered_count;
                match connected.first() {
                    Some(other) if universal => *other,
                    _ => return Err(AiError::NoConnectedClient(name.to_string())),
                }
            }
            None => {
                if connected.contains(&default_client) {
                    default_client
                } else {
                    *connected
                        .first()
                        .ok_or_else(|| AiError::NoConnectedClient(name.to_string()))?
                }
            }
        };

        let (client, _) = self.slot(chosen).await?;
        tracing::debug!(target: LOG_TARGET, tool = name, client = %chosen, "routing tool call");
        client.call_tool(name, params).await
    }

    /// Route a resource read by URI scheme to the owning client. No
    /// fallback: resources are not assumed portable across clients.
    pub async fn read_resource(&self, uri: &str) -> Result<String, AiError> {
        let (client, kind) = self.resource_owner(uri).await?;
        let status = client.status().await;
        if !status.connected {
            return Err(AiError::NotConnected(kind.to_string()));
        }
        client.read_resource(uri).await
    }

    /// Subscribe to a resource on its owning client.
    pub async fn subscribe(&self, uri: &str) -> Result<(), AiError> {
        let (client, _) = self.resource_owner(uri).await?;
        client.subscribe(uri).await
    }

    pub async fn unsubscribe(&self, uri: &str) -> Result<(), AiError> {
        let (client, _) = self.resource_owner(uri).await?;
        client.unsubscribe(uri).await
    }

    /// Aggregate per-client connection state.
    pub async fn health_check(&self) -> HealthReport {
        let clients: Vec<(ClientKind, Arc<dyn CapabilityClient>)> = {
            let slots = self.slots.read().await;
            slots
                .iter()
                .map(|(kind, slot)| (*kind, Arc::clone(&slot.client)))
                .collect()
        };
        let futures = clients.into_iter().map(|(kind, client)| async move {
            (kind, client.status().await)
        });
        let statuses: HashMap<ClientKind, ConnectionStatus> =
            join_all(futures).await.into_iter().collect();
        let connected = statuses.values().filter(|s| s.connected).count();
        let state = if statuses.is_empty() || connected == 0 {
            HealthState::Unhealthy
        } else if connected == statuses.len() {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        };
        HealthReport {
            state,
            clients: statuses,
        }
    }

    /// Tear the registry down and rebuild it under a new configuration.
    /// Clients whose kind is no longer enabled are dropped; the rest stay
    /// registered and reconnect when the new configuration auto-connects.
    pub async fn reconfigure(&self, config: OrchestratorConfig) {
        self.disconnect_all().await;
        {
            let mut slots = self.slots.write().await;
            slots.retain(|kind, _| config.enabled_clients.contains(kind));
        }
        self.tool_map.write().await.clear();
        self.scheme_map.write().await.clear();
        let auto_connect = config.auto_connect;
        *self.config.write().await = config;
        if auto_connect {
            self.connect_all().await;
        }
    }

    async fn connect_with_timeout(
        client: &dyn CapabilityClient,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<(), AiError> {
        match tokio::time::timeout(timeout, client.connect(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::api_error(
                408,
                format!("connect to {} timed out", client.kind()),
            )),
        }
    }

    async fn slot(
        &self,
        kind: ClientKind,
    ) -> Result<(Arc<dyn CapabilityClient>, String), AiError> {
        let slots = self.slots.read().await;
        slots
            .get(&kind)
            .map(|slot| (Arc::clone(&slot.client), slot.endpoint.clone()))
            .ok_or_else(|| {
                AiError::ConfigurationError(format!("client kind {kind} is not registered"))
            })
    }

    async fn connected_clients(&self) -> Vec<(ClientKind, Arc<dyn CapabilityClient>)> {
        let clients: Vec<(ClientKind, Arc<dyn CapabilityClient>)> = {
            let slots = self.slots.read().await;
            slots
                .iter()
                .map(|(kind, slot)| (*kind, Arc::clone(&slot.client)))
                .collect()
        };
        let futures = clients.into_iter().map(|(kind, client)| async move {
            let connected = client.status().await.connected;
            (kind, client, connected)
        });
        join_all(futures)
            .await
            .into_iter()
            .filter(|(_, _, connected)| *connected)
            .map(|(kind, client, _)| (kind, client))
            .collect()
    }

    /// Error for a name outside the declared-capability map. The name is
    /// classified the way the keyword heuristic would route it; a registered
    /// but disconnected owner reports the disconnection, not an unknown tool.
    async fn undeclared_tool_error(&self, name: &str) -> AiError {
        let default_client = self.config.read().await.default_client;
        let kind = keyword_preference(name).unwrap_or(default_client);
        match self.slot(kind).await {
            Ok((client, _)) => {
                if client.status().await.connected {
                    AiError::ToolNotFound(name.to_string())
                } else {
                    AiError::NoConnectedClient(name.to_string())
                }
            }
            Err(_) => AiError::ToolNotFound(name.to_string()),
        }
    }

    async fn resource_owner(
        &self,
        uri: &str,
    ) -> Result<(Arc<dyn CapabilityClient>, ClientKind), AiError> {
        let scheme = uri
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| AiError::ResourceNotFound(uri.to_string()))?;
        let learned = self.scheme_map.read().await.get(scheme).copied();
        let kind = learned
            .or_else(|| builtin_scheme_owner(scheme))
            .ok_or_else(|| AiError::ResourceNotFound(uri.to_string()))?;
        let (client, _) = self
            .slot(kind)
            .await
            .map_err(|_| AiError::ResourceNotFound(uri.to_string()))?;
        Ok((client, kind))
    }

    /// Rebuild the tool and scheme maps from every currently connected
    /// client's own declarations.
    async fn rebuild_routing_maps(&self) {
        let clients = self.connected_clients().await;
        let mut tool_map: HashMap<String, Vec<ClientKind>> = HashMap::new();
        let mut scheme_map: HashMap<String, ClientKind> = HashMap::new();
        for (kind, client) in clients {
            match client.list_tools().await {
                Ok(tools) => {
                    for tool in tools {
                        let entry = tool_map.entry(tool.name).or_default();
                        if !entry.contains(&kind) {
                            entry.push(kind);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, client = %kind, error = %e, "tool listing failed during map rebuild");
                }
            }
            match client.list_resources().await {
                Ok(resources) => {
                    for resource in resources {
                        if let Some((scheme, _)) = resource.uri.split_once("://") {
                            scheme_map.entry(scheme.to_string()).or_insert(kind);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, client = %kind, error = %e, "resource listing failed during map rebuild");
                }
            }
        }
        *self.tool_map.write().await = tool_map;
        *self.scheme_map.write().await = scheme_map;
    }
}

/// Keyword preference, kept only as a tie-break between declaring clients.
fn keyword_preference(name: &str) -> Option<ClientKind> {
    let lowered = name.to_lowercase();
    if ["store", "save", "record", "persist"]
        .iter()
        .any(|k| lowered.contains(k))
    {
        Some(ClientKind::Store)
    } else if ["analy", "generate", "outline", "workflow", "document"]
        .iter()
        .any(|k| lowered.contains(k))
    {
        Some(ClientKind::Workflow)
    } else {
        None
    }
}

/// Static scheme ownership, so routing can name a disconnected owner instead
/// of reporting the resource unknown.
fn builtin_scheme_owner(scheme: &str) -> Option<ClientKind> {
    match scheme {
        "generic" => Some(ClientKind::Generic),
        "store" => Some(ClientKind::Store),
        "workflow" | "doc" => Some(ClientKind::Workflow),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{GenericClient, WorkflowClient};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn health_reflects_connected_counts() {
        let orch = orchestrator();
        orch.register(Arc::new(GenericClient::new()), "local://generic")
            .await
            .unwrap();
        orch.register(Arc::new(WorkflowClient::new()), "local://workflow")
            .await
            .unwrap();

        assert_eq!(orch.health_check().await.state, HealthState::Unhealthy);

        orch.connect_client(ClientKind::Generic).await.unwrap();
        assert_eq!(orch.health_check().await.state, HealthState::Degraded);

        orch.connect_client(ClientKind::Workflow).await.unwrap();
        assert_eq!(orch.health_check().await.state, HealthState::Healthy);
    }

    #[tokio::test]
    async fn tools_are_tagged_with_their_origin() {
        let orch = orchestrator();
        orch.register(Arc::new(GenericClient::new()), "local://generic")
            .await
            .unwrap();
        orch.register(Arc::new(WorkflowClient::new()), "local://workflow")
            .await
            .unwrap();
        orch.connect_all().await;

        let tools = orch.get_all_tools().await;
        // echo is declared by both clients, once per origin.
        let echo_origins: Vec<ClientKind> = tools
            .iter()
            .filter(|t| t.tool.name == "echo")
            .map(|t| t.client)
            .collect();
        assert_eq!(echo_origins.len(), 2);
        assert!(
            tools
                .iter()
                .any(|t| t.tool.name == "analyze_document" && t.client == ClientKind::Workflow)
        );
    }

    #[tokio::test]
    async fn domain_tool_routes_to_its_declaring_client() {
        let orch = orchestrator();
        orch.register(Arc::new(GenericClient::new()), "local://generic")
            .await
            .unwrap();
        orch.register(Arc::new(WorkflowClient::new()), "local://workflow")
            .await
            .unwrap();
        orch.connect_all().await;

        let outcome = orch
            .execute_tool(
                "generate_outline",
                serde_json::json!({"text": "requirements"}),
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.metadata["client"], "workflow");
    }

    #[tokio::test]
    async fn reconfigure_drops_disabled_clients() {
        let orch = orchestrator();
        orch.register(Arc::new(GenericClient::new()), "local://generic")
            .await
            .unwrap();
        orch.register(Arc::new(WorkflowClient::new()), "local://workflow")
            .await
            .unwrap();
        orch.connect_all().await;

        orch.reconfigure(OrchestratorConfig {
            enabled_clients: vec![ClientKind::Generic],
            auto_connect: true,
            ..OrchestratorConfig::default()
        })
        .await;

        let report = orch.health_check().await;
        assert_eq!(report.clients.len(), 1);
        assert_eq!(report.state, HealthState::Healthy);
        assert!(matches!(
            orch.connect_client(ClientKind::Workflow).await,
            Err(AiError::ConfigurationError(_))
        ));
    }
}
