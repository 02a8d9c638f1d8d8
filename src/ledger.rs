//! Usage ledger — append-only record of every completion call.
//!
//! Records are written once per call (including failed calls, at zero cost)
//! and never mutated afterwards. Reads are aggregate folds filtered by user,
//! model, and time range; quota checks and usage stats are both built on the
//! same query path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AiError;
use crate::types::{CostBreakdown, ProviderKind, TokenUsage};

/// Outcome recorded for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
}

/// One append-only usage entry keyed by (user, model, provider, timestamp).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub model: String,
    pub provider: ProviderKind,
    pub tokens: TokenUsage,
    pub cost: CostBreakdown,
    /// Wall-clock duration of the upstream call in milliseconds
    pub duration_ms: u64,
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// Record for a completed call.
    pub fn success(
        user_id: impl Into<String>,
        model: impl Into<String>,
        provider: ProviderKind,
        tokens: TokenUsage,
        cost: CostBreakdown,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            project_id: None,
            conversation_id: None,
            model: model.into(),
            provider,
            tokens,
            cost,
            duration_ms,
            status: CallStatus::Success,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Record for a failed call. Failed calls are audited at zero cost.
    pub fn failure(
        user_id: impl Into<String>,
        model: impl Into<String>,
        provider: ProviderKind,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            project_id: None,
            conversation_id: None,
            model: model.into(),
            provider,
            tokens: TokenUsage::default(),
            cost: CostBreakdown::default(),
            duration_ms,
            status: CallStatus::Error,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Filter for ledger reads. All fields are conjunctive; `None` matches all.
#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    pub user_id: Option<String>,
    pub model: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl UsageQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    fn matches(&self, record: &UsageRecord) -> bool {
        if let Some(user) = &self.user_id {
            if &record.user_id != user {
                return false;
            }
        }
        if let Some(model) = &self.model {
            if &record.model != model {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp >= until {
                return false;
            }
        }
        true
    }
}

/// Append-only usage store collaborator.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Append one record. Atomic per record; no update-in-place exists.
    async fn append(&self, record: UsageRecord) -> Result<(), AiError>;

    /// Read records matching the query, oldest first.
    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>, AiError>;
}

/// In-memory ledger for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<UsageRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageLedger for MemoryLedger {
    async fn append(&self, record: UsageRecord) -> Result<(), AiError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>, AiError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| query.matches(r)).cloned().collect())
    }
}
