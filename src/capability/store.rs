//! Persistence-domain capability client.
//!
//! Wraps an opaque structured store behind CRUD tools. The base tool set is
//! loaded first and the store tools appended; dispatch falls through to the
//! base implementation for names outside the store set. Store operations that
//! fail (missing document, rejected write) are business results and come back
//! inside the [`ToolOutcome`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AiError;

use super::client::{CapabilityClient, ClientCore};
use super::generic::{base_resources, base_tools, dispatch_base_tool, read_base_resource};
use super::types::{
    CapabilityResource, CapabilityTool, ClientKind, ConnectionStatus, ToolOutcome,
};

/// Opaque structured-store collaborator: create/read/update/delete against
/// named collections. The business-entity schema is not this crate's concern.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Cheap connectivity probe used at connect time.
    async fn ping(&self) -> Result<(), AiError>;

    async fn create(
        &self,
        collection: &str,
        document: serde_json::Value,
    ) -> Result<String, AiError>;

    async fn read(&self, collection: &str, id: &str) -> Result<Option<serde_json::Value>, AiError>;

    async fn update(
        &self,
        collection: &str,
        id: &str,
        document: serde_json::Value,
    ) -> Result<bool, AiError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, AiError>;

    async fn list(&self, collection: &str) -> Result<Vec<serde_json::Value>, AiError>;
}

fn store_tools() -> Vec<CapabilityTool> {
    let doc_schema = serde_json::json!({
        "type": "object",
        "properties": {
            "collection": {"type": "string"},
            "id": {"type": "string"},
            "document": {"type": "object"}
        },
        "required": ["collection"]
    });
    vec![
        CapabilityTool::new("store_create", "Create a document in a collection", doc_schema.clone()),
        CapabilityTool::new("store_get", "Fetch a document by id", doc_schema.clone()),
        CapabilityTool::new("store_update", "Update a document by id", doc_schema.clone()),
        CapabilityTool::new("store_delete", "Delete a document by id", doc_schema.clone()),
        CapabilityTool::new("store_list", "List documents in a collection", doc_schema),
    ]
}

fn store_resources() -> Vec<CapabilityResource> {
    vec![
        CapabilityResource::new(
            "store://collections",
            "Collections",
            "Names of the collections this store serves",
        )
        .with_mime_type("application/json"),
    ]
}

/// Capability client for the structured store.
pub struct StoreClient {
    core: ClientCore,
    store: Arc<dyn StructuredStore>,
    collections: Vec<String>,
}

impl StoreClient {
    pub fn new(store: Arc<dyn StructuredStore>, collections: Vec<String>) -> Self {
        Self {
            core: ClientCore::new(ClientKind::Store),
            store,
            collections,
        }
    }

    fn param_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
        params.get(key).and_then(|v| v.as_str())
    }

    async fn dispatch_store_tool(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Option<ToolOutcome> {
        let collection = match Self::param_str(params, "collection") {
            Some(c) => c,
            None => {
                return Some(ToolOutcome::failed("missing required parameter: collection"));
            }
        };
        let outcome = match name {
            "store_create" => {
                let Some(document) = params.get("document").cloned() else {
                    return Some(ToolOutcome::failed("missing required parameter: document"));
                };
                match self.store.create(collection, document).await {
                    Ok(id) => ToolOutcome::ok(serde_json::json!({ "id": id })),
                    Err(e) => ToolOutcome::failed(e.to_string()),
                }
            }
            "store_get" => {
                let Some(id) = Self::param_str(params, "id") else {
                    return Some(ToolOutcome::failed("missing required parameter: id"));
                };
                match self.store.read(collection, id).await {
                    Ok(Some(document)) => ToolOutcome::ok(document),
                    Ok(None) => ToolOutcome::failed(format!("document {id} not found")),
                    Err(e) => ToolOutcome::failed(e.to_string()),
                }
            }
            "store_update" => {
                let Some(id) = Self::param_str(params, "id") else {
                    return Some(ToolOutcome::failed("missing required parameter: id"));
                };
                let Some(document) = params.get("document").cloned() else {
                    return Some(ToolOutcome::failed("missing required parameter: document"));
                };
                match self.store.update(collection, id, document).await {
                    Ok(true) => ToolOutcome::ok(serde_json::json!({ "updated": true })),
                    Ok(false) => ToolOutcome::failed(format!("document {id} not found")),
                    Err(e) => ToolOutcome::failed(e.to_string()),
                }
            }
            "store_delete" => {
                let Some(id) = Self::param_str(params, "id") else {
                    return Some(ToolOutcome::failed("missing required parameter: id"));
                };
                match self.store.delete(collection, id).await {
                    Ok(deleted) => ToolOutcome::ok(serde_json::json!({ "deleted": deleted })),
                    Err(e) => ToolOutcome::failed(e.to_string()),
                }
            }
            "store_list" => match self.store.list(collection).await {
                Ok(documents) => ToolOutcome::ok(serde_json::json!({ "documents": documents })),
                Err(e) => ToolOutcome::failed(e.to_string()),
            },
            _ => return None,
        };
        Some(outcome)
    }
}

#[async_trait]
impl CapabilityClient for StoreClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Store
    }

    async fn connect(&self, endpoint: &str) -> Result<(), AiError> {
        if let Err(e) = self.store.ping().await {
            self.core.set_failed(&e).await;
            return Err(e);
        }
        // Base set first, then the store set appended.
        let mut tools = base_tools();
        tools.extend(store_tools());
        let mut resources = base_resources();
        resources.extend(store_resources());
        self.core.set_connected(endpoint, tools, resources).await;
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
        let outcome = match self.dispatch_store_tool(name, &params).await {
            Some(outcome) => outcome,
            // Fall through to the base set for non-store names.
            None => dispatch_base_tool(name, &params)
                .unwrap_or_else(|| ToolOutcome::failed(format!("no handler for tool {name}"))),
        };
        Ok(outcome.with_metadata("client", serde_json::json!("store")))
    }

    async fn read_resource(&self, uri: &str) -> Result<String, AiError> {
        self.core.ensure_connected().await?;
        if self.core.find_resource(uri).await.is_none() {
            return Err(AiError::ResourceNotFound(uri.to_string()));
        }
        if uri == "store://collections" {
            return serde_json::to_string(&self.collections).map_err(AiError::from);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Minimal in-memory store for tests.
    #[derive(Default)]
    struct FakeStore {
        data: Mutex<HashMap<String, HashMap<String, serde_json::Value>>>,
        fail_ping: bool,
    }

    #[async_trait]
    impl StructuredStore for FakeStore {
        async fn ping(&self) -> Result<(), AiError> {
            if self.fail_ping {
                Err(AiError::api_error(503, "store unavailable"))
            } else {
                Ok(())
            }
        }

        async fn create(
            &self,
            collection: &str,
            document: serde_json::Value,
        ) -> Result<String, AiError> {
            let id = uuid::Uuid::new_v4().to_string();
            self.data
                .lock()
                .await
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), document);
            Ok(id)
        }

        async fn read(
            &self,
            collection: &str,
            id: &str,
        ) -> Result<Option<serde_json::Value>, AiError> {
            Ok(self
                .data
                .lock()
                .await
                .get(collection)
                .and_then(|c| c.get(id))
                .cloned())
        }

        async fn update(
            &self,
            collection: &str,
            id: &str,
            document: serde_json::Value,
        ) -> Result<bool, AiError> {
            let mut data = self.data.lock().await;
            match data.get_mut(collection).and_then(|c| c.get_mut(id)) {
                Some(slot) => {
                    *slot = document;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<bool, AiError> {
            Ok(self
                .data
                .lock()
                .await
                .get_mut(collection)
                .map(|c| c.remove(id).is_some())
                .unwrap_or(false))
        }

        async fn list(&self, collection: &str) -> Result<Vec<serde_json::Value>, AiError> {
            Ok(self
                .data
                .lock()
                .await
                .get(collection)
                .map(|c| c.values().cloned().collect())
                .unwrap_or_default())
        }
    }

    fn client() -> StoreClient {
        StoreClient::new(
            Arc::new(FakeStore::default()),
            vec!["analyses".to_string(), "proposals".to_string()],
        )
    }

    #[tokio::test]
    async fn base_tools_are_appended_not_shadowed() {
        let client = client();
        client.connect("store://main").await.unwrap();
        let tools = client.list_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        // Base set present, then the store set.
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"text_stats"));
        assert!(names.contains(&"store_create"));
        assert_eq!(tools.len(), 7);

        // Base tool dispatch falls through.
        let outcome = client
            .call_tool("echo", serde_json::json!({"message": "hi"}))
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn crud_round_trip_and_missing_document_is_a_value() {
        let client = client();
        client.connect("store://main").await.unwrap();

        let created = client
            .call_tool(
                "store_create",
                serde_json::json!({"collection": "analyses", "document": {"title": "rfp-1"}}),
            )
            .await
            .unwrap();
        assert!(created.success);
        let id = created.data.unwrap()["id"].as_str().unwrap().to_string();

        let fetched = client
            .call_tool(
                "store_get",
                serde_json::json!({"collection": "analyses", "id": id}),
            )
            .await
            .unwrap();
        assert!(fetched.success);
        assert_eq!(fetched.data.unwrap()["title"], "rfp-1");

        // Missing document: tool ran, business result failed, no exception.
        let missing = client
            .call_tool(
                "store_get",
                serde_json::json!({"collection": "analyses", "id": "nope"}),
            )
            .await
            .unwrap();
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn failed_connect_records_error_and_stays_disconnected() {
        let store = Arc::new(FakeStore {
            fail_ping: true,
            ..FakeStore::default()
        });
        let client = StoreClient::new(store, vec![]);
        assert!(client.connect("store://down").await.is_err());
        let status = client.status().await;
        assert!(!status.connected);
        assert!(status.error.is_some());
    }
}
