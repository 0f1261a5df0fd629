//! OpenAI-dialect wire types (`POST /v1/chat/completions`, `/v1/completions`, spec.md §6).

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StopValue {
	Single(String),
	Many(Vec<String>),
}

impl StopValue {
	pub fn into_vec(self) -> Vec<String> {
		match self {
			StopValue::Single(s) => vec![s],
			StopValue::Many(v) => v,
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCall {
	pub id: String,
	#[serde(rename = "type")]
	pub ty: String,
	pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCallFunction {
	pub name: String,
	pub arguments: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
	pub role: String,
	#[serde(default)]
	pub content: Option<String>,
	#[serde(default)]
	pub tool_calls: Option<Vec<ToolCall>>,
	#[serde(default)]
	pub tool_call_id: Option<String>,
	#[serde(default)]
	pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDef {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
	#[serde(rename = "type")]
	pub ty: String,
	pub function: FunctionDef,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiRequest {
	pub model: String,
	pub messages: Vec<Message>,
	#[serde(default)]
	pub max_tokens: Option<u32>,
	#[serde(default)]
	pub temperature: Option<f32>,
	#[serde(default)]
	pub top_p: Option<f32>,
	#[serde(default)]
	pub stream: Option<bool>,
	#[serde(default)]
	pub tools: Option<Vec<Tool>>,
	#[serde(default)]
	pub tool_choice: Option<serde_json::Value>,
	#[serde(default)]
	pub stop: Option<StopValue>,
	#[serde(default)]
	pub response_format: Option<serde_json::Value>,
}

impl OpenAiRequest {
	pub fn parse(body: serde_json::Value) -> Result<Self, GatewayError> {
		let req: OpenAiRequest = serde_json::from_value(body).map_err(|e| {
			GatewayError::validation("body", e.to_string())
		})?;
		if req.messages.is_empty() {
			return Err(GatewayError::validation("messages", "must be non-empty"));
		}
		if req.model.trim().is_empty() {
			return Err(GatewayError::validation("model", "must be non-empty"));
		}
		for m in &req.messages {
			if !matches!(m.role.as_str(), "user" | "assistant" | "system" | "tool") {
				return Err(GatewayError::validation("messages[].role", format!("unknown role {}", m.role)));
			}
		}
		Ok(req)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn rejects_unknown_role() {
		let body = json!({
			"model": "gpt-4o",
			"messages": [{"role": "narrator", "content": "hi"}]
		});
		let err = OpenAiRequest::parse(body).unwrap_err();
		assert_eq!(err.kind(), crate::error::FailureKind::Validation);
	}

	#[test]
	fn accepts_stop_as_single_string_or_array() {
		let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}], "stop": "END"});
		let req = OpenAiRequest::parse(body).unwrap();
		assert_eq!(req.stop.unwrap().into_vec(), vec!["END".to_string()]);
	}
}
