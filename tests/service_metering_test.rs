//! Service-level metering, quota, and audit behavior against fake adapters.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;

use switchboard::{
    AiError, CallStatus, ChatMessage, Choice, CompletionAdapter, CompletionRequest,
    CompletionResponse, CompletionStream, CostBreakdown, FinishReason, MemoryLedger,
    MessageRole, ModelCapability, ModelCatalog, ModelDescriptor, ProviderKind, QuotaFailureMode,
    QuotaPolicy, StreamDelta, Timeframe, TokenUsage, UsageLedger, UsageQuery, UsageRecord,
};

fn test_catalog() -> ModelCatalog {
    ModelCatalog::new(
        ProviderKind::Custom("fake".to_string()),
        vec![ModelDescriptor {
            id: "test-model".to_string(),
            provider: ProviderKind::Custom("fake".to_string()),
            upstream_name: "test-model".to_string(),
            max_tokens: 4096,
            context_window: 8192,
            input_cost_per_1k: 0.002,
            output_cost_per_1k: 0.004,
            capabilities: vec![ModelCapability::Chat, ModelCapability::Streaming],
        }],
    )
}

/// Adapter that answers from memory and counts upstream attempts.
struct FakeAdapter {
    catalog: ModelCatalog,
    calls: AtomicUsize,
    usage: TokenUsage,
    fail: bool,
    /// Incremented when a produced stream's transport is dropped
    stream_drops: Arc<AtomicUsize>,
}

impl FakeAdapter {
    fn new(usage: TokenUsage) -> Self {
        Self {
            catalog: test_catalog(),
            calls: AtomicUsize::new(0),
            usage,
            fail: false,
            stream_drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(TokenUsage::default())
        }
    }
}

struct DropSpy(Arc<AtomicUsize>);

impl Drop for DropSpy {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompletionAdapter for FakeAdapter {
    fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AiError::api_error(500, "upstream exploded"));
        }
        let usage = self.usage;
        let cost = CostBreakdown::new(
            self.calculate_cost(usage.prompt_tokens, &request.model, true),
            self.calculate_cost(usage.completion_tokens, &request.model, false),
        );
        Ok(CompletionResponse {
            id: "resp-1".to_string(),
            model: request.model.clone(),
            provider: ProviderKind::Custom("fake".to_string()),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: MessageRole::Assistant,
                    content: "ok".to_string(),
                },
                finish_reason: FinishReason::Stop,
            }],
            usage,
            cost,
        })
    }

    async fn stream(&self, _request: &CompletionRequest) -> Result<CompletionStream, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spy = DropSpy(Arc::clone(&self.stream_drops));
        let usage = self.usage;
        let stream = try_stream! {
            let _transport = spy;
            for i in 0..10 {
                yield StreamDelta::text(format!("chunk-{i}"));
            }
            yield StreamDelta::usage(usage);
        };
        Ok(Box::pin(stream))
    }
}

fn service_with(
    adapter: Arc<FakeAdapter>,
) -> (switchboard::AiService, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    let service = switchboard::AiService::new(Arc::clone(&ledger) as Arc<dyn UsageLedger>)
        .with_adapter(adapter);
    (service, ledger)
}

fn request() -> CompletionRequest {
    CompletionRequest::new("test-model", "user-1", "hello")
}

#[tokio::test]
async fn cost_follows_catalog_rates() {
    let adapter = FakeAdapter::new(TokenUsage::new(100, 50));
    assert_eq!(adapter.calculate_cost(1000, "test-model", true), 0.002);
    assert_eq!(adapter.calculate_cost(1000, "test-model", false), 0.004);
    assert_eq!(adapter.calculate_cost(500, "test-model", true), 0.001);
    // Unknown models price at zero instead of failing.
    assert_eq!(adapter.calculate_cost(1000, "mystery", true), 0.0);
    assert_eq!(adapter.calculate_cost(1000, "mystery", false), 0.0);
}

#[tokio::test]
async fn response_cost_total_is_the_sum_of_directions() {
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(100, 50)));
    let (service, _ledger) = service_with(Arc::clone(&adapter));

    let response = service.generate(request()).await.unwrap();
    let expected_input = adapter.calculate_cost(100, "test-model", true);
    let expected_output = adapter.calculate_cost(50, "test-model", false);
    assert_eq!(response.cost.input, expected_input);
    assert_eq!(response.cost.output, expected_output);
    assert_eq!(response.cost.total, expected_input + expected_output);
    assert_eq!(response.usage.total_tokens, 150);
}

#[tokio::test]
async fn usage_stats_read_is_idempotent() {
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(100, 50)));
    let (service, _ledger) = service_with(Arc::clone(&adapter));

    service.generate(request()).await.unwrap();
    service.generate(request()).await.unwrap();

    let first = service.get_usage_stats("user-1", Timeframe::Month).await.unwrap();
    let second = service.get_usage_stats("user-1", Timeframe::Month).await.unwrap();
    assert_eq!(first.total.requests, 2);
    assert_eq!(first.total.requests, second.total.requests);
    assert_eq!(first.total.tokens, second.total.tokens);
    assert_eq!(first.total.cost, second.total.cost);
    assert_eq!(first.by_model["test-model"].tokens, second.by_model["test-model"].tokens);
}

#[tokio::test]
async fn quota_rejects_on_the_call_after_the_ceiling_is_reached() {
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(100, 50)));
    let ledger = Arc::new(MemoryLedger::new());
    let service = switchboard::AiService::new(Arc::clone(&ledger) as Arc<dyn UsageLedger>)
        .with_adapter(Arc::clone(&adapter) as Arc<dyn CompletionAdapter>)
        .with_default_policy(QuotaPolicy {
            max_tokens_per_month: 300,
            max_cost_per_month: 1000.0,
        });

    // 0 used: allowed. 150 used: still under, the crossing call is admitted.
    service.generate(request()).await.unwrap();
    service.generate(request()).await.unwrap();

    // 300 used >= 300: rejected before any upstream attempt.
    let err = service.generate(request()).await.unwrap_err();
    assert!(matches!(err, AiError::QuotaExceeded { kind: "tokens", .. }));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);

    let info = service.get_quota_info("user-1").await.unwrap();
    assert_eq!(info.tokens_used, 300);
    assert_eq!(info.percentage_used, 100.0);
}

#[tokio::test]
async fn unknown_model_never_reaches_upstream() {
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(1, 1)));
    let (service, _ledger) = service_with(Arc::clone(&adapter));

    let err = service
        .generate(CompletionRequest::new("mystery", "user-1", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, AiError::ModelNotFound(_)));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_call_still_leaves_an_audit_record() {
    let adapter = Arc::new(FakeAdapter::failing());
    let (service, ledger) = service_with(Arc::clone(&adapter));

    let err = service.generate(request()).await.unwrap_err();
    assert!(matches!(err, AiError::ApiError { code: 500, .. }));

    let records = ledger
        .query(&UsageQuery::for_user("user-1"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CallStatus::Error);
    assert_eq!(records[0].tokens.total_tokens, 0);
    assert_eq!(records[0].cost.total, 0.0);
    assert!(records[0].error.is_some());
}

/// Ledger whose reads always fail; appends are accepted and discarded.
struct BrokenLedger;

#[async_trait]
impl UsageLedger for BrokenLedger {
    async fn append(&self, _record: UsageRecord) -> Result<(), AiError> {
        Ok(())
    }

    async fn query(&self, _query: &UsageQuery) -> Result<Vec<UsageRecord>, AiError> {
        Err(AiError::InternalError("ledger offline".to_string()))
    }
}

#[tokio::test]
async fn ledger_read_failure_follows_the_configured_mode() {
    // Default mode: availability wins, the call goes through.
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(10, 5)));
    let service = switchboard::AiService::new(Arc::new(BrokenLedger))
        .with_adapter(Arc::clone(&adapter) as Arc<dyn CompletionAdapter>);
    service.generate(request()).await.unwrap();
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);

    // Deny mode: the call is refused without an upstream attempt.
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(10, 5)));
    let service = switchboard::AiService::new(Arc::new(BrokenLedger))
        .with_adapter(Arc::clone(&adapter) as Arc<dyn CompletionAdapter>)
        .with_quota_failure_mode(QuotaFailureMode::Deny);
    assert!(service.generate(request()).await.is_err());
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn per_user_policy_overrides_the_default() {
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(100, 50)));
    let (service, _ledger) = service_with(Arc::clone(&adapter));
    service
        .set_user_policy(
            "user-1",
            QuotaPolicy {
                max_tokens_per_month: 100,
                max_cost_per_month: 1000.0,
            },
        )
        .await;

    service.generate(request()).await.unwrap();
    let err = service.generate(request()).await.unwrap_err();
    assert!(matches!(err, AiError::QuotaExceeded { .. }));

    // Other users stay on the default policy.
    let other = CompletionRequest::new("test-model", "user-2", "hello");
    service.generate(other).await.unwrap();
}

#[tokio::test]
async fn dropping_a_stream_consumer_releases_the_transport_once() {
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(100, 50)));
    let (service, _ledger) = service_with(Arc::clone(&adapter));

    let mut stream = service.stream(request()).await.unwrap();
    let mut received = 0;
    while let Some(delta) = stream.next().await {
        delta.unwrap();
        received += 1;
        if received == 2 {
            break;
        }
    }
    drop(stream);
    assert_eq!(received, 2);
    assert_eq!(adapter.stream_drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn completed_stream_is_metered_from_its_usage_update() {
    let adapter = Arc::new(FakeAdapter::new(TokenUsage::new(100, 50)));
    let (service, ledger) = service_with(Arc::clone(&adapter));

    let mut stream = service.stream(request()).await.unwrap();
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        text.push_str(&delta.unwrap().text);
    }
    drop(stream);
    assert!(text.contains("chunk-0") && text.contains("chunk-9"));

    let records = ledger.query(&UsageQuery::for_user("user-1")).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CallStatus::Success);
    assert_eq!(records[0].tokens.total_tokens, 150);
    assert_eq!(adapter.stream_drops.load(Ordering::SeqCst), 1);
}
