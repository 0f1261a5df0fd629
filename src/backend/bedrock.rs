//! AWS Bedrock backend client (§4.7), grounded in the teacher's
//! `llm/bedrock.rs` path-construction logic. Auth follows spec.md §6
//! literally — an `Authorization` bearer header plus a region header — not
//! the teacher's full AWS SigV4 signing stack (see DESIGN.md). Unary POST
//! only, per current policy (§4.9).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use super::{
	BackendClient, ConnectionResource, FinishIndicator, NeutralToolChoice, ResponseOutput, ResponseStream,
	ResponsesInput, ResponsesRequest, ResponsesResponse, Usage,
};
use crate::error::GatewayError;
use crate::strng::{self, Strng};

#[derive(Debug, Clone)]
pub struct BedrockConfig {
	pub region: Strng,
	pub bearer_token: SecretString,
	pub model_override: Option<Strng>,
	pub timeout: Duration,
	pub max_retries: u32,
}

impl BedrockConfig {
	pub fn validate(&self) -> Result<(), GatewayError> {
		if self.region.is_empty() {
			return Err(GatewayError::validation("region", "must be non-empty"));
		}
		if self.bearer_token.expose_secret().is_empty() {
			return Err(GatewayError::validation("bearer_token", "must be non-empty"));
		}
		if self.timeout.is_zero() {
			return Err(GatewayError::validation("timeout", "must be positive"));
		}
		Ok(())
	}

	/// Mirrors the teacher's `bedrock::Provider::get_host`.
	pub fn host(&self) -> String {
		format!("bedrock-runtime.{}.amazonaws.com", self.region)
	}

	/// Mirrors the teacher's `bedrock::Provider::get_path_for_route`,
	/// simplified to the two route kinds this gateway uses.
	pub fn path(&self, model: &str) -> String {
		let model = self.model_override.as_deref().unwrap_or(model);
		format!("/model/{model}/converse")
	}
}

pub struct BedrockClient {
	config: BedrockConfig,
	http: reqwest::Client,
	resources: Arc<super::pool::ResourceTracker>,
}

impl BedrockClient {
	pub fn new(config: BedrockConfig) -> Result<Self, GatewayError> {
		config.validate()?;
		let http = super::pool::build_http_client("llm-gateway/bedrock", config.timeout)?;
		Ok(Self { config, http, resources: Arc::new(super::pool::ResourceTracker::new()) })
	}

	pub fn active_resource_count(&self) -> usize {
		self.resources.active_count()
	}

	pub async fn shutdown(&self, grace: Duration) {
		self.resources.shutdown(grace).await;
	}

	fn wire_body(req: &ResponsesRequest) -> serde_json::Value {
		let messages = match &req.input {
			ResponsesInput::Text(text) => vec![serde_json::json!({"role": "user", "content": [{"text": text}]})],
			ResponsesInput::Messages(msgs) => msgs
				.iter()
				.map(|m| serde_json::json!({"role": m.role.as_str(), "content": [{"text": m.content}]}))
				.collect(),
		};
		let mut body = serde_json::json!({ "messages": messages });
		let obj = body.as_object_mut().unwrap();

		let mut inference = serde_json::Map::new();
		if let Some(v) = req.max_output_tokens {
			inference.insert("maxTokens".into(), serde_json::json!(v));
		}
		if let Some(v) = req.temperature {
			inference.insert("temperature".into(), serde_json::json!(v));
		}
		if let Some(v) = req.top_p {
			inference.insert("topP".into(), serde_json::json!(v));
		}
		if !req.stop.is_empty() {
			inference.insert("stopSequences".into(), serde_json::json!(req.stop));
		}
		if !inference.is_empty() {
			obj.insert("inferenceConfig".into(), serde_json::Value::Object(inference));
		}

		if !req.tools.is_empty() {
			let tools: Vec<_> = req
				.tools
				.iter()
				.map(|t| serde_json::json!({"toolSpec": {"name": t.name.as_str(), "description": t.description, "inputSchema": {"json": t.parameters}}}))
				.collect();
			let tool_choice = match &req.tool_choice {
				Some(NeutralToolChoice::Tool { name }) => serde_json::json!({"tool": {"name": name.as_str()}}),
				_ => serde_json::json!({"auto": {}}),
			};
			obj.insert("toolConfig".into(), serde_json::json!({"tools": tools, "toolChoice": tool_choice}));
		}

		body
	}

	fn parse_response(model: &str, body: &serde_json::Value) -> Result<ResponsesResponse, GatewayError> {
		let mut output = Vec::new();
		if let Some(blocks) = body.get("output").and_then(|o| o.get("message")).and_then(|m| m.get("content")).and_then(|c| c.as_array())
		{
			for block in blocks {
				if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
					output.push(ResponseOutput::Text { text: text.to_string() });
				} else if let Some(tool_use) = block.get("toolUse") {
					output.push(ResponseOutput::ToolCall {
						id: tool_use.get("toolUseId").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
						name: tool_use.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
						arguments: tool_use.get("input").cloned().unwrap_or(serde_json::Value::Null),
					});
				}
			}
		}

		let usage = body
			.get("usage")
			.map(|u| Usage {
				prompt_tokens: u.get("inputTokens").and_then(|v| v.as_u64()).unwrap_or(0),
				completion_tokens: u.get("outputTokens").and_then(|v| v.as_u64()).unwrap_or(0),
				total_tokens: u.get("totalTokens").and_then(|v| v.as_u64()).unwrap_or(0),
				reasoning_tokens: None,
			})
			.unwrap_or_default()
			.normalized();

		let finish_indicator = match body.get("stopReason").and_then(|v| v.as_str()) {
			Some("max_tokens") => Some(FinishIndicator::Length),
			Some("tool_use") => Some(FinishIndicator::ToolUse),
			_ if output.iter().any(|o| matches!(o, ResponseOutput::ToolCall { .. })) => Some(FinishIndicator::ToolUse),
			_ => Some(FinishIndicator::Stop),
		};

		Ok(ResponsesResponse {
			id: strng::new(uuid::Uuid::new_v4().to_string()),
			created: chrono::Utc::now().timestamp(),
			model: strng::new(model),
			output,
			usage,
			finish_indicator,
		})
	}
}

#[async_trait]
impl BackendClient for BedrockClient {
	fn name(&self) -> Strng {
		strng::literal!("aws.bedrock")
	}

	async fn create_response(&self, req: &ResponsesRequest, cancel: CancellationToken) -> Result<ResponsesResponse, GatewayError> {
		let resource = Arc::new(ConnectionResource::new(strng::new(uuid::Uuid::new_v4().to_string())));
		self.resources.track(resource.clone());

		let url = format!("https://{}{}", self.config.host(), self.config.path(&req.model));
		let send = self
			.http
			.post(&url)
			.header(http::header::AUTHORIZATION, format!("Bearer {}", self.config.bearer_token.expose_secret()))
			.header("x-aws-region", self.config.region.as_str())
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
			return Err(GatewayError::Upstream5xx { status, body_excerpt: strng::new("bedrock converse request failed") });
		}
		let body: serde_json::Value = response.json().await.map_err(GatewayError::from)?;
		Self::parse_response(&req.model, &body)
	}

	/// Bedrock is unary-only under current policy (§4.9); streaming callers
	/// are served via the Streaming Engine's simulated mode instead.
	async fn create_response_stream(&self, _req: &ResponsesRequest, _cancel: CancellationToken) -> Result<ResponseStream, GatewayError> {
		Err(GatewayError::UnsupportedConversion(strng::literal!("bedrock native streaming")))
	}

	fn supports_native_streaming(&self) -> bool {
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg() -> BedrockConfig {
		BedrockConfig {
			region: strng::new("us-east-1"),
			bearer_token: SecretString::from("token123"),
			model_override: None,
			timeout: Duration::from_secs(30),
			max_retries: 3,
		}
	}

	#[test]
	fn host_and_path_follow_teacher_shape() {
		let c = cfg();
		assert_eq!(c.host(), "bedrock-runtime.us-east-1.amazonaws.com");
		assert_eq!(c.path("anthropic.claude-3-sonnet"), "/model/anthropic.claude-3-sonnet/converse");
	}

	#[test]
	fn rejects_empty_region() {
		let mut c = cfg();
		c.region = strng::EMPTY;
		assert!(c.validate().is_err());
	}

	#[test]
	fn parses_text_and_tool_use_blocks() {
		let body = serde_json::json!({
			"output": {"message": {"role": "assistant", "content": [
				{"text": "hello"},
				{"toolUse": {"toolUseId": "t1", "name": "calculator", "input": {"a": 1}}}
			]}},
			"stopReason": "tool_use",
			"usage": {"inputTokens": 5, "outputTokens": 3, "totalTokens": 8}
		});
		let resp = BedrockClient::parse_response("anthropic.claude-3-sonnet", &body).unwrap();
		assert_eq!(resp.output.len(), 2);
		assert!(matches!(resp.finish_indicator, Some(FinishIndicator::ToolUse)));
	}
}
