//! Claude-dialect wire types (`POST /v1/messages`, spec.md §6).

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
	System,
	Tool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ContentValue {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
	Text { text: String },
	ToolUse { id: String, name: String, input: serde_json::Value },
	ToolResult {
		tool_use_id: String,
		#[serde(default)]
		content: Option<ContentValue>,
	},
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
	pub role: Role,
	pub content: ContentValue,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
	Auto,
	Any,
	Tool { name: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaudeRequest {
	pub model: String,
	pub messages: Vec<Message>,
	#[serde(default)]
	pub system: Option<ContentValue>,
	pub max_tokens: u32,
	#[serde(default)]
	pub temperature: Option<f32>,
	#[serde(default)]
	pub top_p: Option<f32>,
	#[serde(default)]
	pub stream: Option<bool>,
	#[serde(default)]
	pub tools: Option<Vec<Tool>>,
	#[serde(default)]
	pub tool_choice: Option<ToolChoice>,
	#[serde(default)]
	pub stop_sequences: Option<Vec<String>>,
}

impl ClaudeRequest {
	/// Validates shape; fails with `Validation{field, reason}` on a missing or
	/// wrongly-typed field (§4.2). Deserialization itself rejects most type
	/// errors; the remaining checks are structural (non-empty messages, known roles).
	pub fn parse(body: serde_json::Value) -> Result<Self, GatewayError> {
		let req: ClaudeRequest = serde_json::from_value(body).map_err(|e| {
			GatewayError::validation("body", e.to_string())
		})?;
		if req.messages.is_empty() {
			return Err(GatewayError::validation("messages", "must be non-empty"));
		}
		if req.model.trim().is_empty() {
			return Err(GatewayError::validation("model", "must be non-empty"));
		}
		Ok(req)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn rejects_empty_messages() {
		let body = json!({"model": "claude-3-5-sonnet-20241022", "messages": [], "max_tokens": 10});
		let err = ClaudeRequest::parse(body).unwrap_err();
		assert_eq!(err.kind(), crate::error::FailureKind::Validation);
	}

	#[test]
	fn parses_minimal_request() {
		let body = json!({
			"model": "claude-3-5-sonnet-20241022",
			"messages": [{"role": "user", "content": "Hello"}],
			"max_tokens": 50
		});
		let req = ClaudeRequest::parse(body).unwrap();
		assert_eq!(req.messages.len(), 1);
	}
}
