//! End-to-end scenarios against a `Gateway` wired to a mocked Azure backend
//! (§8 S1-S6). The mock stands in for the Responses API; assertions check the
//! caller-facing envelope in each dialect, not the wire format the mock sees.

use std::time::Duration;

use http::HeaderMap;
use secrecy::SecretString;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_gateway::backend::azure::AzureConfig;
use llm_gateway::backend::BackendClient;
use llm_gateway::config::{Config, ConversationConfig, LogFormat, LoggingConfig};
use llm_gateway::resilience::breaker::BreakerConfig;
use llm_gateway::strng;
use llm_gateway::Gateway;

fn azure_config(host: &str) -> AzureConfig {
	AzureConfig {
		host: strng::new(host),
		api_key: SecretString::from("test-key".to_string()),
		model_deployment: None,
		api_version: strng::new("v1"),
		timeout: Duration::from_secs(5),
		max_retries: 3,
	}
}

fn test_config(host: &str, failure_threshold: u32) -> Config {
	Config {
		bind_addr: strng::new("127.0.0.1:0"),
		request_body_limit_bytes: 10_485_760,
		logging: LoggingConfig { env_filter: strng::new("info"), format: LogFormat::Text },
		conversation: ConversationConfig {
			max_age: Duration::from_secs(3600),
			cleanup_interval: Duration::from_secs(300),
			max_stored_conversations: 1000,
		},
		breaker: BreakerConfig { failure_threshold, recovery_timeout: Duration::from_millis(50) },
		content_security_validation_enabled: true,
		graceful_degradation_enabled: false,
		azure: Some(azure_config(host)),
		bedrock: None,
	}
}

fn completed_response(id: &str, text: &str) -> serde_json::Value {
	json!({
		"id": id,
		"created_at": 1000,
		"model": "gpt-4o",
		"output": [{"type": "text", "text": text}],
		"usage": {"input_tokens": 5, "output_tokens": 3, "total_tokens": 8},
	})
}

/// S1: a Claude unary request against a backend that returns one text output
/// round-trips into a Claude message with `stop_reason: end_turn`.
#[tokio::test]
async fn s1_claude_unary_round_trips() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/openai/v1/responses"))
		.respond_with(ResponseTemplate::new(200).set_body_json(completed_response("resp_1", "Hi.")))
		.mount(&server)
		.await;

	let gateway = Gateway::new(&test_config(&server.uri(), 5)).unwrap();
	let body = json!({
		"model": "claude-3-5-sonnet-20241022",
		"messages": [{"role": "user", "content": "Hello"}],
		"max_tokens": 50,
	});
	let outcome = gateway.handle_unary("/v1/messages", body, &HeaderMap::new(), CancellationToken::new()).await;

	assert_eq!(outcome.status, 200);
	assert_eq!(outcome.body["type"], "message");
	assert_eq!(outcome.body["role"], "assistant");
	assert_eq!(outcome.body["content"][0]["type"], "text");
	assert_eq!(outcome.body["content"][0]["text"], "Hi.");
	assert_eq!(outcome.body["stop_reason"], "end_turn");
	assert!(outcome.body["usage"]["input_tokens"].is_u64());
	assert!(outcome.body["usage"]["output_tokens"].is_u64());
}

/// S2: an OpenAI streaming request over a unary backend is simulated; the
/// concatenated deltas reconstruct the full sentence and the stream ends with
/// a terminating `data: [DONE]` line.
#[tokio::test]
async fn s2_openai_streaming_is_simulated_and_reconstructs_text() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/openai/v1/responses"))
		.respond_with(ResponseTemplate::new(200).set_body_json(completed_response("resp_2", "The sky is blue today.")))
		.mount(&server)
		.await;

	let gateway = Gateway::new(&test_config(&server.uri(), 5)).unwrap();
	let body = json!({
		"model": "gpt-4o",
		"messages": [{"role": "user", "content": "describe the sky"}],
		"stream": true,
	});
	let (headers, sse) = gateway
		.handle_stream("/v1/chat/completions", body, &HeaderMap::new(), CancellationToken::new())
		.await
		.unwrap();

	use axum::response::IntoResponse;
	use http_body_util::BodyExt;
	let response = (headers, sse).into_response();
	let bytes = response.into_body().collect().await.unwrap().to_bytes();
	let text = String::from_utf8(bytes.to_vec()).unwrap();

	let reconstructed: String = text
		.lines()
		.filter(|l| l.starts_with("data:"))
		.map(|l| l.trim_start_matches("data:").trim())
		.filter(|d| *d != "[DONE]")
		.filter_map(|d| serde_json::from_str::<serde_json::Value>(d).ok())
		.filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(|s| s.to_string()))
		.collect();

	assert_eq!(reconstructed, "The sky is blue today.");
	assert!(text.contains("data: [DONE]"));
}

/// S3: a Claude tool-use request against a backend that emits a `function_call`
/// output yields `stop_reason: tool_use` and a `tool_use` content block.
#[tokio::test]
async fn s3_claude_tool_use() {
	let server = MockServer::start().await;
	let body = json!({
		"id": "resp_3",
		"created_at": 1000,
		"model": "gpt-4o",
		"output": [{"type": "function_call", "id": "call_1", "name": "calculator", "arguments": {"expression": "2+2"}}],
		"usage": {"input_tokens": 10, "output_tokens": 2, "total_tokens": 12},
	});
	Mock::given(method("POST")).and(path("/openai/v1/responses")).respond_with(ResponseTemplate::new(200).set_body_json(body)).mount(&server).await;

	let gateway = Gateway::new(&test_config(&server.uri(), 5)).unwrap();
	let request_body = json!({
		"model": "claude-3-5-sonnet-20241022",
		"messages": [{"role": "user", "content": "what is 2+2?"}],
		"max_tokens": 50,
		"tools": [{"name": "calculator", "input_schema": {"type": "object"}}],
	});
	let outcome = gateway.handle_unary("/v1/messages", request_body, &HeaderMap::new(), CancellationToken::new()).await;

	assert_eq!(outcome.status, 200);
	assert_eq!(outcome.body["stop_reason"], "tool_use");
	let tool_block = outcome.body["content"].as_array().unwrap().iter().find(|c| c["type"] == "tool_use").unwrap();
	assert_eq!(tool_block["name"], "calculator");
}

/// S4: the first two backend calls time out, the third succeeds; the caller
/// sees one 200 response and the retry counter observes exactly two retries.
#[tokio::test]
async fn s4_retry_then_succeed() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/openai/v1/responses"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
		.up_to_n_times(2)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/openai/v1/responses"))
		.respond_with(ResponseTemplate::new(200).set_body_json(completed_response("resp_4", "ok")))
		.mount(&server)
		.await;

	let mut config = test_config(&server.uri(), 5);
	config.azure.as_mut().unwrap().timeout = Duration::from_millis(50);
	let gateway = Gateway::new(&config).unwrap();
	let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
	let outcome = gateway.handle_unary("/v1/chat/completions", body, &HeaderMap::new(), CancellationToken::new()).await;

	assert_eq!(outcome.status, 200);
	let snap = gateway.metrics.snapshot();
	assert!(snap.retries_total >= 2);
}

/// S5: after `failureThreshold` prior failures, the circuit trips and the
/// next call fails fast without reaching the backend.
#[tokio::test]
async fn s5_circuit_open_short_circuits() {
	let server = MockServer::start().await;
	Mock::given(method("POST")).and(path("/openai/v1/responses")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

	let mut config = test_config(&server.uri(), 3);
	config.azure.as_mut().unwrap().timeout = Duration::from_millis(200);
	let gateway = Gateway::new(&config).unwrap();
	let body = || json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});

	for _ in 0..3 {
		let outcome = gateway.handle_unary("/v1/chat/completions", body(), &HeaderMap::new(), CancellationToken::new()).await;
		assert_ne!(outcome.status, 0);
	}

	let start = std::time::Instant::now();
	let outcome = gateway.handle_unary("/v1/chat/completions", body(), &HeaderMap::new(), CancellationToken::new()).await;
	let elapsed = start.elapsed();

	assert_eq!(outcome.status, 503);
	assert!(elapsed < Duration::from_millis(50), "circuit-open call took {elapsed:?}, expected a fast fail");
}

/// S6: canceling before the backend call resolves terminates the request with
/// a `Canceled` classification and releases the tracked connection resource.
#[tokio::test]
async fn s6_cancel_mid_request_releases_resource() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/openai/v1/responses"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
		.mount(&server)
		.await;

	let azure = llm_gateway::backend::azure::AzureClient::new(azure_config(&server.uri())).unwrap();
	let req = llm_gateway::backend::ResponsesRequest {
		model: strng::new("gpt-4o"),
		input: llm_gateway::backend::ResponsesInput::Text("hi".to_string()),
		reasoning_effort: llm_gateway::backend::ReasoningEffort::Medium,
		max_output_tokens: None,
		temperature: None,
		top_p: None,
		stream: false,
		previous_response_id: None,
		tools: Vec::new(),
		tool_choice: None,
		stop: Vec::new(),
		response_format: None,
	};

	let cancel = CancellationToken::new();
	let before = azure.active_resource_count();
	let cancel2 = cancel.clone();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(20)).await;
		cancel2.cancel();
	});
	let result = azure.create_response(&req, cancel).await;

	assert!(matches!(result, Err(llm_gateway::error::GatewayError::Canceled)));
	assert_eq!(azure.active_resource_count(), before);
}
