//! AI completion service — adapter registry, quota pre-flight, dispatch,
//! and usage metering.
//!
//! Control flow for one call: resolve the model to an adapter, check the
//! user's quota against the ledger, dispatch, price the response, append a
//! usage record. Failed upstream calls are audited too, at zero cost, before
//! the error propagates. A rejected call never reaches the upstream and
//! never incurs cost.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::RwLock;

use crate::error::AiError;
use crate::ledger::{UsageLedger, UsageQuery, UsageRecord};
use crate::quota::{
    QuotaFailureMode, QuotaInfo, QuotaPolicy, Timeframe, UsageAggregate, UsageStats,
    billing_period_start,
};
use crate::traits::{CompletionAdapter, CompletionStream};
use crate::types::{
    ChatMessage, CompletionRequest, CompletionResponse, CostBreakdown, ModelDescriptor,
    TokenUsage,
};

/// Multi-provider completion service. Constructed once by the composition
/// root; cheap to share behind an `Arc`.
pub struct AiService {
    adapters: Vec<Arc<dyn CompletionAdapter>>,
    ledger: Arc<dyn UsageLedger>,
    default_policy: QuotaPolicy,
    user_policies: RwLock<HashMap<String, QuotaPolicy>>,
    failure_mode: QuotaFailureMode,
}

impl AiService {
    pub fn new(ledger: Arc<dyn UsageLedger>) -> Self {
        Self {
            adapters: Vec::new(),
            ledger,
            default_policy: QuotaPolicy::default(),
            user_policies: RwLock::new(HashMap::new()),
            failure_mode: QuotaFailureMode::default(),
        }
    }

    /// Register a completion adapter. Later registrations do not shadow
    /// earlier ones; the first catalog declaring a model id wins.
    pub fn with_adapter(mut self, adapter: Arc<dyn CompletionAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_default_policy(mut self, policy: QuotaPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_quota_failure_mode(mut self, mode: QuotaFailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Override the quota policy for one user.
    pub async fn set_user_policy(&self, user_id: impl Into<String>, policy: QuotaPolicy) {
        self.user_policies.write().await.insert(user_id.into(), policy);
    }

    async fn policy_for(&self, user_id: &str) -> QuotaPolicy {
        self.user_policies
            .read()
            .await
            .get(user_id)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Scan registered catalogs for the model id. Fails with
    /// [`AiError::ModelNotFound`] when no provider declares it — before any
    /// upstream call is attempted.
    pub fn resolve_provider(&self, model_id: &str) -> Result<Arc<dyn CompletionAdapter>, AiError> {
        self.adapters
            .iter()
            .find(|a| a.catalog().declares(model_id))
            .cloned()
            .ok_or_else(|| AiError::ModelNotFound(model_id.to_string()))
    }

    /// All models across registered catalogs.
    pub fn list_models(&self) -> Vec<ModelDescriptor> {
        self.adapters
            .iter()
            .flat_map(|a| a.catalog().models().iter().cloned())
            .collect()
    }

    /// Whether the user is still under both monthly ceilings for this model.
    /// A user at or past either ceiling is rejected on the next call, never
    /// before. Ledger-read failures resolve per the configured
    /// [`QuotaFailureMode`] (allow by default) and are logged, not silent.
    pub async fn check_quota(&self, user_id: &str, model_id: &str) -> Result<bool, AiError> {
        let policy = self.policy_for(user_id).await;
        let query = UsageQuery::for_user(user_id)
            .model(model_id)
            .since(billing_period_start(chrono::Utc::now()));
        let records = match self.ledger.query(&query).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    target: "switchboard::service",
                    error = %e,
                    user = user_id,
                    "ledger read failed during quota check; applying {:?} mode",
                    self.failure_mode
                );
                return Ok(self.failure_mode == QuotaFailureMode::Allow);
            }
        };
        let tokens_used: u64 = records.iter().map(|r| u64::from(r.tokens.total_tokens)).sum();
        let cost_used: f64 = records.iter().map(|r| r.cost.total).sum();
        Ok(tokens_used < policy.max_tokens_per_month && cost_used < policy.max_cost_per_month)
    }

    async fn preflight(&self, user_id: &str, model_id: &str) -> Result<(), AiError> {
        if self.check_quota(user_id, model_id).await? {
            return Ok(());
        }
        let policy = self.policy_for(user_id).await;
        let info = self.get_quota_info(user_id).await?;
        // Name the ceiling that was actually hit so callers can distinguish
        // "wait for the period to roll" from "upgrade".
        if info.tokens_used >= policy.max_tokens_per_month {
            Err(AiError::QuotaExceeded {
                kind: "tokens",
                used: info.tokens_used as f64,
                ceiling: policy.max_tokens_per_month as f64,
            })
        } else {
            Err(AiError::QuotaExceeded {
                kind: "cost",
                used: info.cost_used,
                ceiling: policy.max_cost_per_month,
            })
        }
    }

    /// Execute a completion with quota pre-flight and audit append.
    pub async fn generate(&self, request: CompletionRequest) -> Result<CompletionResponse, AiError> {
        let adapter = self.resolve_provider(&request.model)?;
        self.preflight(&request.user_id, &request.model).await?;

        let provider = adapter.catalog().provider().clone();
        let started = Instant::now();
        match adapter.generate(&request).await {
            Ok(response) => {
                let record = UsageRecord::success(
                    &request.user_id,
                    &request.model,
                    provider,
                    response.usage,
                    response.cost,
                    started.elapsed().as_millis() as u64,
                );
                self.append_audit(record).await;
                Ok(response)
            }
            Err(e) => {
                let record = UsageRecord::failure(
                    &request.user_id,
                    &request.model,
                    provider,
                    started.elapsed().as_millis() as u64,
                    e.to_string(),
                );
                self.append_audit(record).await;
                Err(e)
            }
        }
    }

    /// Execute a streaming completion. Usage is metered from the stream's
    /// final usage update when the backend reports one; the record is
    /// appended when the stream ends.
    pub async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, AiError> {
        let adapter = self.resolve_provider(&request.model)?;
        self.preflight(&request.user_id, &request.model).await?;

        let provider = adapter.catalog().provider().clone();
        let started = Instant::now();
        let mut inner = match adapter.stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                let record = UsageRecord::failure(
                    &request.user_id,
                    &request.model,
                    provider,
                    started.elapsed().as_millis() as u64,
                    e.to_string(),
                );
                self.append_audit(record).await;
                return Err(e);
            }
        };

        let ledger = Arc::clone(&self.ledger);
        let user_id = request.user_id.clone();
        let model = request.model.clone();
        let stream = async_stream::stream! {
            let mut usage = TokenUsage::default();
            let mut failed: Option<String> = None;
            while let Some(item) = inner.next().await {
                match &item {
                    Ok(delta) => {
                        if let Some(u) = delta.usage {
                            usage = u;
                        }
                    }
                    Err(e) => failed = Some(e.to_string()),
                }
                let stop = item.is_err();
                yield item;
                if stop {
                    break;
                }
            }
            let record = match failed {
                None => {
                    let cost = CostBreakdown::new(
                        adapter.calculate_cost(usage.prompt_tokens, &model, true),
                        adapter.calculate_cost(usage.completion_tokens, &model, false),
                    );
                    UsageRecord::success(
                        &user_id,
                        &model,
                        provider.clone(),
                        usage,
                        cost,
                        started.elapsed().as_millis() as u64,
                    )
                }
                Some(error) => UsageRecord::failure(
                    &user_id,
                    &model,
                    provider.clone(),
                    started.elapsed().as_millis() as u64,
                    error,
                ),
            };
            if let Err(e) = ledger.append(record).await {
                tracing::warn!(
                    target: "switchboard::service",
                    error = %e,
                    "failed to append streaming usage record"
                );
            }
        };
        let stream: CompletionStream = Box::pin(stream);
        Ok(stream)
    }

    /// Fold the user's records over a timeframe into total/by-provider/
    /// by-model aggregates. A pure read; calling it twice with no
    /// intervening activity returns identical aggregates.
    pub async fn get_usage_stats(
        &self,
        user_id: &str,
        timeframe: Timeframe,
    ) -> Result<UsageStats, AiError> {
        let query =
            UsageQuery::for_user(user_id).since(timeframe.window_start(chrono::Utc::now()));
        let records = self.ledger.query(&query).await?;

        let mut total = UsageAggregate::default();
        let mut by_provider: HashMap<String, UsageAggregate> = HashMap::new();
        let mut by_model: HashMap<String, UsageAggregate> = HashMap::new();
        for record in &records {
            let tokens = u64::from(record.tokens.total_tokens);
            total.add(tokens, record.cost.total);
            by_provider
                .entry(record.provider.to_string())
                .or_default()
                .add(tokens, record.cost.total);
            by_model
                .entry(record.model.clone())
                .or_default()
                .add(tokens, record.cost.total);
        }
        Ok(UsageStats {
            user_id: user_id.to_string(),
            timeframe,
            total,
            by_provider,
            by_model,
        })
    }

    /// Used-versus-ceiling view for the current billing month.
    pub async fn get_quota_info(&self, user_id: &str) -> Result<QuotaInfo, AiError> {
        let policy = self.policy_for(user_id).await;
        let query =
            UsageQuery::for_user(user_id).since(billing_period_start(chrono::Utc::now()));
        let records = self.ledger.query(&query).await?;
        let tokens_used: u64 = records.iter().map(|r| u64::from(r.tokens.total_tokens)).sum();
        let cost_used: f64 = records.iter().map(|r| r.cost.total).sum();
        Ok(QuotaInfo::new(user_id, tokens_used, cost_used, policy))
    }

    /// Fixed-prompt composition: summarize and analyze a text.
    pub async fn analyze_text(
        &self,
        model_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<String, AiError> {
        let request = CompletionRequest::new(model_id, user_id, "").with_messages(vec![
            ChatMessage::system(
                "You are an analyst. Summarize the key points, tone, and any action items.",
            ),
            ChatMessage::user(text),
        ]);
        let response = self.generate(request).await?;
        response
            .content_text()
            .map(str::to_string)
            .ok_or_else(|| AiError::InternalError("no text in analysis response".to_string()))
    }

    /// Fixed-prompt composition: generate code for a description.
    pub async fn generate_code(
        &self,
        model_id: &str,
        user_id: &str,
        description: &str,
        language: &str,
    ) -> Result<String, AiError> {
        let request = CompletionRequest::new(model_id, user_id, "").with_messages(vec![
            ChatMessage::system(format!(
                "You are an expert {language} developer. Respond with code only, no prose."
            )),
            ChatMessage::user(description),
        ]);
        let response = self.generate(request).await?;
        response
            .content_text()
            .map(str::to_string)
            .ok_or_else(|| AiError::InternalError("no code in response".to_string()))
    }

    async fn append_audit(&self, record: UsageRecord) {
        if let Err(e) = self.ledger.append(record).await {
            tracing::warn!(
                target: "switchboard::service",
                error = %e,
                "failed to append usage record"
            );
        }
    }
}
