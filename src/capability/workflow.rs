//! Document/workflow-domain capability client.
//!
//! Declares the analysis, generation, and workflow tools on top of the base
//! set. Tool bodies here are deliberately local computations: the heavy
//! lifting belongs to the completion service, and this client's job is the
//! capability surface, not model quality.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::AiError;

use super::client::{CapabilityClient, ClientCore};
use super::generic::{base_resources, base_tools, dispatch_base_tool, read_base_resource};
use super::types::{
    CapabilityResource, CapabilityTool, ClientKind, ConnectionStatus, ToolOutcome,
};

fn workflow_tools() -> Vec<CapabilityTool> {
    let text_schema = serde_json::json!({
        "type": "object",
        "properties": {"text": {"type": "string"}},
        "required": ["text"]
    });
    vec![
        CapabilityTool::new(
            "analyze_document",
            "Extract structure and key terms from a document",
            text_schema.clone(),
        ),
        CapabilityTool::new(
            "generate_outline",
            "Generate a section outline for a response document",
            text_schema,
        ),
        CapabilityTool::new(
            "start_workflow",
            "Start a named multi-step workflow",
            serde_json::json!({
                "type": "object",
                "properties": {"workflow": {"type": "string"}},
                "required": ["workflow"]
            }),
        ),
        CapabilityTool::new(
            "workflow_status",
            "Check the state of a running workflow",
            serde_json::json!({
                "type": "object",
                "properties": {"run_id": {"type": "string"}},
                "required": ["run_id"]
            }),
        ),
    ]
}

fn workflow_resources() -> Vec<CapabilityResource> {
    vec![
        CapabilityResource::new(
            "workflow://templates/proposal",
            "Proposal template",
            "Default section template for proposal documents",
        )
        .with_mime_type("text/markdown"),
        CapabilityResource::new(
            "workflow://templates/analysis",
            "Analysis template",
            "Default checklist for document analysis",
        )
        .with_mime_type("text/markdown"),
    ]
}

const PROPOSAL_TEMPLATE: &str = "# Proposal\n\n1. Executive summary\n2. Understanding of requirements\n3. Approach\n4. Timeline\n5. Pricing\n";
const ANALYSIS_TEMPLATE: &str = "# Analysis checklist\n\n- Scope\n- Deadlines\n- Evaluation criteria\n- Mandatory requirements\n";

/// Capability client for document analysis and workflow operations.
pub struct WorkflowClient {
    core: ClientCore,
    runs: Mutex<HashMap<String, String>>,
}

impl WorkflowClient {
    pub fn new() -> Self {
        Self {
            core: ClientCore::new(ClientKind::Workflow),
            runs: Mutex::new(HashMap::new()),
        }
    }

    async fn dispatch_workflow_tool(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Option<ToolOutcome> {
        let outcome = match name {
            "analyze_document" => match params.get("text").and_then(|t| t.as_str()) {
                None => ToolOutcome::failed("missing required parameter: text"),
                Some(text) if text.trim().is_empty() => {
                    ToolOutcome::failed("document is empty")
                }
                Some(text) => {
                    let headings: Vec<&str> = text
                        .lines()
                        .filter(|l| l.starts_with('#'))
                        .map(|l| l.trim_start_matches('#').trim())
                        .collect();
                    ToolOutcome::ok(serde_json::json!({
                        "headings": headings,
                        "paragraphs": text.split("\n\n").count(),
                        "words": text.split_whitespace().count(),
                    }))
                }
            },
            "generate_outline" => match params.get("text").and_then(|t| t.as_str()) {
                None => ToolOutcome::failed("missing required parameter: text"),
                Some(_) => ToolOutcome::ok(serde_json::json!({
                    "sections": [
                        "Executive summary",
                        "Understanding of requirements",
                        "Approach",
                        "Timeline",
                        "Pricing",
                    ]
                })),
            },
            "start_workflow" => match params.get("workflow").and_then(|w| w.as_str()) {
                None => ToolOutcome::failed("missing required parameter: workflow"),
                Some(workflow) => {
                    let run_id = uuid::Uuid::new_v4().to_string();
                    self.runs
                        .lock()
                        .await
                        .insert(run_id.clone(), workflow.to_string());
                    ToolOutcome::ok(serde_json::json!({
                        "run_id": run_id,
                        "workflow": workflow,
                        "state": "running",
                    }))
                }
            },
            "workflow_status" => match params.get("run_id").and_then(|r| r.as_str()) {
                None => ToolOutcome::failed("missing required parameter: run_id"),
                Some(run_id) => match self.runs.lock().await.get(run_id) {
                    Some(workflow) => ToolOutcome::ok(serde_json::json!({
                        "run_id": run_id,
                        "workflow": workflow,
                        "state": "running",
                    })),
                    None => ToolOutcome::failed(format!("unknown workflow run {run_id}")),
                },
            },
            _ => return None,
        };
        Some(outcome)
    }
}

impl Default for WorkflowClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityClient for WorkflowClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Workflow
    }

    async fn connect(&self, endpoint: &str) -> Result<(), AiError> {
        let mut tools = base_tools();
        tools.extend(workflow_tools());
        let mut resources = base_resources();
        resources.extend(workflow_resources());
        self.core.set_connected(endpoint, tools, resources).await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AiError> {
        self.core.set_disconnected().await;
        self.runs.lock().await.clear();
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
        let outcome = match self.dispatch_workflow_tool(name, &params).await {
            Some(outcome) => outcome,
            None => dispatch_base_tool(name, &params)
                .unwrap_or_else(|| ToolOutcome::failed(format!("no handler for tool {name}"))),
        };
        Ok(outcome.with_metadata("client", serde_json::json!("workflow")))
    }

    async fn read_resource(&self, uri: &str) -> Result<String, AiError> {
        self.core.ensure_connected().await?;
        if self.core.find_resource(uri).await.is_none() {
            return Err(AiError::ResourceNotFound(uri.to_string()));
        }
        match uri {
            "workflow://templates/proposal" => Ok(PROPOSAL_TEMPLATE.to_string()),
            "workflow://templates/analysis" => Ok(ANALYSIS_TEMPLATE.to_string()),
            other => read_base_resource(other)
                .ok_or_else(|| AiError::ResourceNotFound(other.to_string())),
        }
    }

    async fn subscribe(&self, uri: &str) -> Result<(), AiError> {
        self.core.subscribe(uri).await
    }

    async fn unsubscribe(&self, uri: &str) -> Result<(), AiError> {
        self.core.unsubscribe(uri).await
    }
}
