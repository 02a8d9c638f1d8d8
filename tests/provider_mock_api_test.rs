//! Mock API tests for the provider adapters.
//!
//! Wiremock stands in for each upstream; the assertions cover the
//! normalization contract each backend shape has to honor.

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchboard::{
    AdapterConfig, AiError, AnthropicAdapter, CompletionAdapter, CompletionRequest,
    ErrorCategory, OllamaAdapter, OpenAiAdapter, ProviderKind,
};

fn request(model: &str) -> CompletionRequest {
    CompletionRequest::new(model, "user-1", "Hello")
}

#[tokio::test]
async fn openai_response_is_normalized_and_priced() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
        })))
        .mount(&mock_server)
        .await;

    let adapter = OpenAiAdapter::new(
        AdapterConfig::new(mock_server.uri()).with_api_key("test-api-key"),
    )
    .unwrap();
    let response = adapter.generate(&request("gpt-4o-mini")).await.unwrap();

    assert_eq!(response.provider, ProviderKind::OpenAi);
    assert_eq!(response.content_text(), Some("Hello there"));
    assert_eq!(response.usage.total_tokens, 21);
    // Priced from the catalog rates for gpt-4o-mini.
    assert!((response.cost.input - 9.0 / 1000.0 * 0.000_15).abs() < 1e-12);
    assert!((response.cost.output - 12.0 / 1000.0 * 0.000_6).abs() < 1e-12);
    assert!((response.cost.total - (response.cost.input + response.cost.output)).abs() < 1e-12);
}

#[tokio::test]
async fn openai_error_body_maps_to_api_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "rate_limit_error"}
        })))
        .mount(&mock_server)
        .await;

    let adapter = OpenAiAdapter::new(
        AdapterConfig::new(mock_server.uri()).with_api_key("test-api-key"),
    )
    .unwrap();
    let err = adapter.generate(&request("gpt-4o-mini")).await.unwrap_err();

    match &err {
        AiError::ApiError { code, message, .. } => {
            assert_eq!(*code, 429);
            assert!(message.contains("Rate limit"));
        }
        other => panic!("expected ApiError, got {other:?}"),
    }
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn openai_stream_stops_at_done_and_skips_bad_chunks() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: not json at all\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":2,\"total_tokens\":11}}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"after the end\"}}]}\n\n",
    );
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let adapter = OpenAiAdapter::new(
        AdapterConfig::new(mock_server.uri()).with_api_key("test-api-key"),
    )
    .unwrap();
    let mut stream = adapter.stream(&request("gpt-4o-mini")).await.unwrap();

    let mut text = String::new();
    let mut usage = None;
    while let Some(delta) = stream.next().await {
        let delta = delta.unwrap();
        text.push_str(&delta.text);
        if delta.usage.is_some() {
            usage = delta.usage;
        }
    }
    assert_eq!(text, "Hello");
    assert_eq!(usage.unwrap().total_tokens, 11);
}

#[tokio::test]
async fn anthropic_content_blocks_concatenate_and_system_is_lifted() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-api-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": " again"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 15, "output_tokens": 4}
        })))
        .mount(&mock_server)
        .await;

    let adapter = AnthropicAdapter::new(
        AdapterConfig::new(mock_server.uri()).with_api_key("test-api-key"),
    )
    .unwrap();
    let response = adapter.generate(&request("claude-haiku")).await.unwrap();

    assert_eq!(response.provider, ProviderKind::Anthropic);
    assert_eq!(response.content_text(), Some("Hello again"));
    assert_eq!(response.usage.prompt_tokens, 15);
    assert_eq!(response.usage.completion_tokens, 4);
    assert_eq!(response.usage.total_tokens, 19);
}

#[tokio::test]
async fn anthropic_missing_usage_defaults_to_zero() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_02",
            "content": [{"type": "text", "text": "no counters here"}]
        })))
        .mount(&mock_server)
        .await;

    let adapter = AnthropicAdapter::new(
        AdapterConfig::new(mock_server.uri()).with_api_key("test-api-key"),
    )
    .unwrap();
    let response = adapter.generate(&request("claude-haiku")).await.unwrap();

    assert_eq!(response.usage.total_tokens, 0);
    assert_eq!(response.cost.total, 0.0);
}

#[tokio::test]
async fn ollama_alternate_usage_fields_map_to_counters() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "Local hello"},
            "done": true,
            "prompt_eval_count": 26,
            "eval_count": 8
        })))
        .mount(&mock_server)
        .await;

    let adapter = OllamaAdapter::new(AdapterConfig::new(mock_server.uri())).unwrap();
    let response = adapter.generate(&request("llama3.2")).await.unwrap();

    assert_eq!(response.provider, ProviderKind::Ollama);
    assert_eq!(response.content_text(), Some("Local hello"));
    assert_eq!(response.usage.prompt_tokens, 26);
    assert_eq!(response.usage.completion_tokens, 8);
    assert_eq!(response.usage.total_tokens, 34);
    // Local models price at zero.
    assert_eq!(response.cost.total, 0.0);
}

#[tokio::test]
async fn ollama_stream_degrades_to_a_single_full_yield() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "whole answer"},
            "done": true,
            "prompt_eval_count": 5,
            "eval_count": 3
        })))
        .mount(&mock_server)
        .await;

    let adapter = OllamaAdapter::new(AdapterConfig::new(mock_server.uri())).unwrap();
    let stream = adapter.stream(&request("llama3.2")).await.unwrap();
    let deltas: Vec<_> = stream.collect().await;

    let texts: Vec<String> = deltas
        .iter()
        .map(|d| d.as_ref().unwrap().text.clone())
        .filter(|t| !t.is_empty())
        .collect();
    assert_eq!(texts, vec!["whole answer".to_string()]);
    let usage = deltas
        .iter()
        .find_map(|d| d.as_ref().unwrap().usage)
        .unwrap();
    assert_eq!(usage.total_tokens, 8);
}
