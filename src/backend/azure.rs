//! Azure-compatible "Responses" API backend client (§4.7), grounded in the
//! teacher's `llm/azureopenai.rs` path-construction logic and
//! `llm/conversion/responses.rs`'s stream event handling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use super::sse_reader::{sse_event_stream, SseEvent};
use super::{
	BackendClient, ConnectionResource, FinishIndicator, NeutralToolChoice, ReasoningStatus, ResponseOutput,
	ResponseStream, ResponsesInput, ResponsesRequest, ResponsesResponse, ResponsesStreamChunk, StreamOutputDelta, Usage,
};
use crate::error::GatewayError;
use crate::strng::{self, Strng};

#[derive(Debug, Clone)]
pub struct AzureConfig {
	/// HTTPS base URL, e.g. `https://my-resource.openai.azure.com`.
	pub host: Strng,
	pub api_key: SecretString,
	pub model_deployment: Option<Strng>,
	pub api_version: Strng,
	pub timeout: Duration,
	pub max_retries: u32,
}

impl AzureConfig {
	/// Validates configuration at construction (§4.7): HTTPS base URL,
	/// non-empty api key, positive timeout, non-negative max retries.
	pub fn validate(&self) -> Result<(), GatewayError> {
		if !self.host.starts_with("https://") {
			return Err(GatewayError::validation("host", "must be an HTTPS base URL"));
		}
		if self.api_key.expose_secret().is_empty() {
			return Err(GatewayError::validation("api_key", "must be non-empty"));
		}
		if self.timeout.is_zero() {
			return Err(GatewayError::validation("timeout", "must be positive"));
		}
		Ok(())
	}

	/// Mirrors the teacher's `azureopenai::Provider::get_path_for_model`: the
	/// `v1` api version uses the stable path, `preview` appends a query
	/// parameter, anything else is a deployment-scoped path.
	pub fn path(&self, model: &str) -> String {
		let t = "responses";
		if self.api_version.as_str() == "v1" {
			format!("/openai/v1/{t}")
		} else if self.api_version.as_str() == "preview" {
			format!("/openai/v1/{t}?api-version=preview")
		} else {
			let model = self.model_deployment.as_deref().unwrap_or(model);
			format!("/openai/deployments/{}/{}?api-version={}", model, t, self.api_version)
		}
	}
}

pub struct AzureClient {
	config: AzureConfig,
	http: reqwest::Client,
	resources: Arc<super::pool::ResourceTracker>,
}

impl AzureClient {
	pub fn new(config: AzureConfig) -> Result<Self, GatewayError> {
		config.validate()?;
		let http = super::pool::build_http_client("llm-gateway/azure", config.timeout)?;
		Ok(Self { config, http, resources: Arc::new(super::pool::ResourceTracker::new()) })
	}

	pub fn active_resource_count(&self) -> usize {
		self.resources.active_count()
	}

	pub async fn shutdown(&self, grace: Duration) {
		self.resources.shutdown(grace).await;
	}

	fn url(&self, model: &str) -> String {
		format!("{}{}", self.config.host, self.config.path(model))
	}

	fn wire_body(req: &ResponsesRequest) -> serde_json::Value {
		let input = match &req.input {
			ResponsesInput::Text(s) => serde_json::Value::String(s.clone()),
			ResponsesInput::Messages(msgs) => serde_json::Value::Array(
				msgs.iter()
					.map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
					.collect(),
			),
		};
		let mut body = serde_json::json!({
			"model": req.model.as_str(),
			"input": input,
			"reasoning": {"effort": reasoning_effort_str(req.reasoning_effort)},
			"stream": req.stream,
		});
		let obj = body.as_object_mut().unwrap();
		if let Some(v) = req.max_output_tokens {
			obj.insert("max_output_tokens".into(), serde_json::json!(v));
		}
		if let Some(v) = req.temperature {
			obj.insert("temperature".into(), serde_json::json!(v));
		}
		if let Some(v) = req.top_p {
			obj.insert("top_p".into(), serde_json::json!(v));
		}
		if let Some(v) = &req.previous_response_id {
			obj.insert("previous_response_id".into(), serde_json::json!(v.as_str()));
		}
		if !req.tools.is_empty() {
			let tools: Vec<_> = req
				.tools
				.iter()
				.map(|t| serde_json::json!({"type": "function", "function": {"name": t.name.as_str(), "description": t.description, "parameters": t.parameters}}))
				.collect();
			obj.insert("tools".into(), serde_json::json!(tools));
		}
		if let Some(tc) = &req.tool_choice {
			obj.insert(
				"tool_choice".into(),
				match tc {
					NeutralToolChoice::Auto => serde_json::json!("auto"),
					NeutralToolChoice::Tool { name } => serde_json::json!({"type": "function", "function": {"name": name.as_str()}}),
				},
			);
		}
		if !req.stop.is_empty() {
			obj.insert("stop".into(), serde_json::json!(req.stop));
		}
		if let Some(rf) = &req.response_format {
			obj.insert("response_format".into(), rf.clone());
		}
		body
	}

	fn parse_full_response(model: &str, body: &serde_json::Value) -> Result<ResponsesResponse, GatewayError> {
		let id = body.get("id").and_then(|v| v.as_str()).unwrap_or_default();
		let created = body.get("created_at").and_then(|v| v.as_i64()).unwrap_or(0);
		let mut output = Vec::new();
		if let Some(items) = body.get("output").and_then(|v| v.as_array()) {
			for item in items {
				if let Some(o) = output_item_to_response_output(item) {
					output.push(o);
				}
			}
		}
		let usage = body
			.get("usage")
			.map(|u| Usage {
				prompt_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
				completion_tokens: u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
				total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
				reasoning_tokens: u.get("reasoning_tokens").and_then(|v| v.as_u64()),
			})
			.unwrap_or_default()
			.normalized();
		let finish_indicator = body.get("incomplete_details").map(|_| FinishIndicator::Length).or_else(|| {
			if output.iter().any(|o| matches!(o, ResponseOutput::ToolCall { .. })) {
				Some(FinishIndicator::ToolUse)
			} else {
				Some(FinishIndicator::Stop)
			}
		});
		Ok(ResponsesResponse {
			id: strng::new(id),
			created,
			model: strng::new(body.get("model").and_then(|v| v.as_str()).unwrap_or(model)),
			output,
			usage,
			finish_indicator,
		})
	}
}

fn reasoning_effort_str(e: super::ReasoningEffort) -> &'static str {
	match e {
		super::ReasoningEffort::Minimal => "minimal",
		super::ReasoningEffort::Low => "low",
		super::ReasoningEffort::Medium => "medium",
		super::ReasoningEffort::High => "high",
	}
}

fn output_item_to_response_output(item: &serde_json::Value) -> Option<ResponseOutput> {
	match item.get("type").and_then(|v| v.as_str())? {
		"text" | "output_text" => Some(ResponseOutput::Text { text: item.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string() }),
		"reasoning" => Some(ResponseOutput::Reasoning {
			content: item.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
			status: if item.get("status").and_then(|v| v.as_str()) == Some("completed") {
				ReasoningStatus::Completed
			} else {
				ReasoningStatus::InProgress
			},
		}),
		"function_call" | "tool_call" => Some(ResponseOutput::ToolCall {
			id: item.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
			name: item.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
			arguments: item.get("arguments").cloned().unwrap_or(serde_json::Value::Null),
		}),
		_ => None,
	}
}

/// Translates one backend SSE event into zero or one `ResponsesStreamChunk`s,
/// per the allow-list in §4.7. Returns `Err` for `response.failed`/`error`;
/// all other event kinds not named here are ignored (`Ok(None)`).
fn translate_event(event: &SseEvent, model: &str) -> Result<Option<ResponsesStreamChunk>, GatewayError> {
	let Ok(value) = serde_json::from_str::<serde_json::Value>(&event.data) else {
		return Ok(None);
	};
	let kind = event.event.as_deref().or_else(|| value.get("type").and_then(|v| v.as_str())).unwrap_or("");

	match kind {
		"response.created" => Ok(Some(ResponsesStreamChunk {
			id: strng::new(value.get("response").and_then(|r| r.get("id")).and_then(|v| v.as_str()).unwrap_or_default()),
			created: value.get("response").and_then(|r| r.get("created_at")).and_then(|v| v.as_i64()).unwrap_or(0),
			model: strng::new(model),
			output: Vec::new(),
			usage: None,
			finish_indicator: None,
		})),
		"response.output_text.delta" => Ok(Some(ResponsesStreamChunk {
			id: strng::EMPTY,
			created: 0,
			model: strng::new(model),
			output: vec![StreamOutputDelta::TextDelta { text: value.get("delta").and_then(|v| v.as_str()).unwrap_or_default().to_string() }],
			usage: None,
			finish_indicator: None,
		})),
		"response.reasoning_text.delta" | "response.reasoning_text.done" => Ok(Some(ResponsesStreamChunk {
			id: strng::EMPTY,
			created: 0,
			model: strng::new(model),
			output: vec![StreamOutputDelta::ReasoningDelta {
				text: value.get("delta").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
				status: if kind.ends_with(".done") { ReasoningStatus::Completed } else { ReasoningStatus::InProgress },
			}],
			usage: None,
			finish_indicator: None,
		})),
		"response.output_item.added" => {
			let Some(item) = value.get("item") else {
				return Ok(None);
			};
			let output = output_item_to_response_output(item).map(|o| match o {
				ResponseOutput::Text { text } => StreamOutputDelta::TextDelta { text },
				ResponseOutput::Reasoning { content, status } => StreamOutputDelta::ReasoningDelta { text: content, status },
				ResponseOutput::ToolCall { id, name, arguments } => {
					StreamOutputDelta::ToolCallDelta { id, name, arguments_fragment: arguments.to_string() }
				}
			});
			Ok(output.map(|o| ResponsesStreamChunk {
				id: strng::EMPTY,
				created: 0,
				model: strng::new(model),
				output: vec![o],
				usage: None,
				finish_indicator: None,
			}))
		}
		"response.completed" => {
			let response = value.get("response").unwrap_or(&value);
			let full = AzureClient::parse_full_response(model, response)?;
			Ok(Some(ResponsesStreamChunk {
				id: full.id,
				created: full.created,
				model: full.model,
				output: full
					.output
					.into_iter()
					.map(|o| match o {
						ResponseOutput::Text { text } => StreamOutputDelta::TextDelta { text },
						ResponseOutput::Reasoning { content, status } => StreamOutputDelta::ReasoningDelta { text: content, status },
						ResponseOutput::ToolCall { id, name, arguments } => {
							StreamOutputDelta::ToolCallDelta { id, name, arguments_fragment: arguments.to_string() }
						}
					})
					.collect(),
				usage: Some(full.usage),
				finish_indicator: full.finish_indicator,
			}))
		}
		"response.failed" | "error" => {
			let message = value.get("error").and_then(|e| e.get("message")).and_then(|v| v.as_str()).unwrap_or("backend stream failed");
			Err(GatewayError::Upstream5xx { status: 502, body_excerpt: strng::new(crate::sanitize::redact(message)) })
		}
		_ => Ok(None),
	}
}

#[async_trait]
impl BackendClient for AzureClient {
	fn name(&self) -> Strng {
		strng::literal!("azure.responses")
	}

	async fn create_response(&self, req: &ResponsesRequest, cancel: CancellationToken) -> Result<ResponsesResponse, GatewayError> {
		let resource = Arc::new(ConnectionResource::new(strng::new(uuid::Uuid::new_v4().to_string())));
		self.resources.track(resource.clone());

		let url = self.url(&req.model);
		let send = self
			.http
			.post(&url)
			.header("api-key", self.config.api_key.expose_secret())
			.json(&Self::wire_body(req))
			.send();

		let result = tokio::select! {
			r = send => r.map_err(GatewayError::from),
			_ = cancel.cancelled() => Err(GatewayError::Canceled),
		};
		self.resources.release(resource.id());

		let response = result?;
		if !response.status().is_success() {
			let status = response.status().as_u16();
			return Err(GatewayError::Upstream5xx { status, body_excerpt: strng::new("azure responses request failed") });
		}
		let body: serde_json::Value = response.json().await.map_err(GatewayError::from)?;
		Self::parse_full_response(&req.model, &body)
	}

	async fn create_response_stream(&self, req: &ResponsesRequest, cancel: CancellationToken) -> Result<ResponseStream, GatewayError> {
		let resource = Arc::new(ConnectionResource::new(strng::new(uuid::Uuid::new_v4().to_string())));
		self.resources.track(resource.clone());

		let url = self.url(&req.model);
		let mut stream_req = req.clone();
		stream_req.stream = true;
		let send = self
			.http
			.post(&url)
			.header("api-key", self.config.api_key.expose_secret())
			.json(&Self::wire_body(&stream_req))
			.send();

		let response = tokio::select! {
			r = send => r.map_err(GatewayError::from)?,
			_ = cancel.cancelled() => { self.resources.release(resource.id()); return Err(GatewayError::Canceled); }
		};
		if !response.status().is_success() {
			self.resources.release(resource.id());
			let status = response.status().as_u16();
			return Err(GatewayError::Upstream5xx { status, body_excerpt: strng::new("azure responses stream request failed") });
		}

		let model = req.model.clone();
		let events = sse_event_stream(response);
		let mapped = events.filter_map(move |r| {
			let model = model.clone();
			async move {
				match r {
					Ok(event) => match translate_event(&event, &model) {
						Ok(Some(chunk)) => Some(Ok(chunk)),
						Ok(None) => None,
						Err(e) => Some(Err(e)),
					},
					Err(e) => Some(Err(e)),
				}
			}
		});
		// The stream now exclusively owns the resource; releasing it from the
		// tracker happens once, when the stream is exhausted or dropped on
		// cancellation (§4.9, §9: a stream iterator exclusively owns its
		// `ConnectionResource`). `resource` itself still disposes via its own
		// `Drop` impl at the same moment.
		let guard = super::pool::ReleaseGuard::new(self.resources.clone(), resource.id().clone());
		let guarded = futures::stream::unfold((mapped, Some((resource, guard))), move |(mut s, guard)| async move {
			match s.next().await {
				Some(item) => Some((item, (s, guard))),
				None => None,
			}
		});
		Ok(Box::pin(guarded))
	}

	fn supports_native_streaming(&self) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg() -> AzureConfig {
		AzureConfig {
			host: strng::new("https://example.openai.azure.com"),
			api_key: SecretString::from("sk-test-key"),
			model_deployment: None,
			api_version: strng::new("v1"),
			timeout: Duration::from_secs(30),
			max_retries: 3,
		}
	}

	#[test]
	fn rejects_non_https_host() {
		let mut c = cfg();
		c.host = strng::new("http://insecure.example.com");
		assert!(c.validate().is_err());
	}

	#[test]
	fn v1_path_is_stable() {
		assert_eq!(cfg().path("gpt-4o"), "/openai/v1/responses");
	}

	#[test]
	fn deployment_scoped_path_uses_api_version() {
		let mut c = cfg();
		c.api_version = strng::new("2024-10-01");
		c.model_deployment = Some(strng::new("my-deployment"));
		assert_eq!(c.path("gpt-4o"), "/openai/deployments/my-deployment/responses?api-version=2024-10-01");
	}

	#[test]
	fn translate_completed_event_carries_usage() {
		let event = SseEvent {
			event: Some("response.completed".to_string()),
			data: serde_json::json!({
				"response": {
					"id": "resp_1",
					"created_at": 100,
					"model": "gpt-4o",
					"output": [{"type": "text", "text": "hi"}],
					"usage": {"input_tokens": 3, "output_tokens": 1, "total_tokens": 4}
				}
			})
			.to_string(),
		};
		let chunk = translate_event(&event, "gpt-4o").unwrap().unwrap();
		assert!(chunk.usage.is_some());
	}

	#[test]
	fn translate_failed_event_is_an_error() {
		let event = SseEvent { event: Some("response.failed".to_string()), data: serde_json::json!({"error": {"message": "boom"}}).to_string() };
		assert!(translate_event(&event, "gpt-4o").is_err());
	}

	#[test]
	fn unknown_event_kind_is_ignored() {
		let event = SseEvent { event: Some("response.some_future_kind".to_string()), data: "{}".to_string() };
		assert!(translate_event(&event, "gpt-4o").unwrap().is_none());
	}
}
