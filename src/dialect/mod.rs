//! Format Detector (§4.1) and the two caller-facing wire dialects.
//!
//! Classification matches a tagged enum onto request shape, following the
//! teacher's `RouteType`/`InputFormat` dispatch idiom in `llm/mod.rs` rather
//! than a class hierarchy (§9).

pub mod claude;
pub mod openai;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
	Claude,
	OpenAi,
}

/// A validated, dialect-tagged caller request (§3 `NormalizedRequest`).
#[derive(Debug, Clone)]
pub enum NormalizedRequest {
	Claude(claude::ClaudeRequest),
	OpenAi(openai::OpenAiRequest),
}

impl NormalizedRequest {
	pub fn dialect(&self) -> Dialect {
		match self {
			NormalizedRequest::Claude(_) => Dialect::Claude,
			NormalizedRequest::OpenAi(_) => Dialect::OpenAi,
		}
	}

	pub fn stream(&self) -> bool {
		match self {
			NormalizedRequest::Claude(r) => r.stream.unwrap_or(false),
			NormalizedRequest::OpenAi(r) => r.stream.unwrap_or(false),
		}
	}

	pub fn model(&self) -> &str {
		match self {
			NormalizedRequest::Claude(r) => &r.model,
			NormalizedRequest::OpenAi(r) => &r.model,
		}
	}
}

/// Decides `claude` vs `openai` from path, body shape, and model prefix (§4.1).
///
/// Tie-break order: path prefix > body shape > model-name prefix. A `claude`
/// classification is downgraded to `openai` when the model id lacks the
/// `claude-` prefix and the path is not `/v1/messages`. Fails safe to
/// `claude` only if detection is ambiguous at the top level (no path match,
/// no decisive body shape, no decisive model prefix).
pub fn detect(path: &str, body: &serde_json::Value) -> Dialect {
	if path == "/v1/messages" {
		return Dialect::Claude;
	}
	if path == "/v1/chat/completions" || path == "/v1/completions" {
		return Dialect::OpenAi;
	}

	let model_is_claude = body
		.get("model")
		.and_then(|m| m.as_str())
		.map(|m| m.starts_with("claude-"))
		.unwrap_or(false);

	if let Some(decision) = detect_by_body_shape(body) {
		// A body-shape `claude` call is downgraded when the model id doesn't
		// corroborate it and the path didn't decisively say `/v1/messages` either.
		if decision == Dialect::Claude && !model_is_claude {
			return Dialect::OpenAi;
		}
		return decision;
	}

	if body.get("model").and_then(|m| m.as_str()).is_some() {
		return if model_is_claude { Dialect::Claude } else { Dialect::OpenAi };
	}

	// No path match, no decisive body shape, no model field at all: ambiguous.
	Dialect::Claude
}

fn detect_by_body_shape(body: &serde_json::Value) -> Option<Dialect> {
	let Some(obj) = body.as_object() else {
		return None;
	};
	let has_claude_system = obj.contains_key("system");
	let has_claude_tool_schema = obj
		.get("tools")
		.and_then(|t| t.as_array())
		.map(|tools| tools.iter().any(|t| t.get("input_schema").is_some()))
		.unwrap_or(false);
	if has_claude_system || has_claude_tool_schema {
		return Some(Dialect::Claude);
	}

	let has_openai_tool_calls = obj
		.get("messages")
		.and_then(|m| m.as_array())
		.map(|msgs| msgs.iter().any(|m| m.get("tool_calls").is_some()))
		.unwrap_or(false);
	let has_response_format = obj.contains_key("response_format");
	if has_openai_tool_calls || has_response_format {
		return Some(Dialect::OpenAi);
	}
	None
}

/// Parses the raw JSON body into a validated, dialect-tagged request.
pub fn normalize_wire(dialect: Dialect, body: serde_json::Value) -> Result<NormalizedRequest, GatewayError> {
	match dialect {
		Dialect::Claude => Ok(NormalizedRequest::Claude(claude::ClaudeRequest::parse(body)?)),
		Dialect::OpenAi => Ok(NormalizedRequest::OpenAi(openai::OpenAiRequest::parse(body)?)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn path_wins_over_body_shape() {
		let body = json!({"model": "gpt-4o", "messages": [], "response_format": {"type": "json_object"}});
		assert_eq!(detect("/v1/messages", &body), Dialect::Claude);
	}

	#[test]
	fn body_shape_used_when_path_unknown() {
		let body = json!({"model": "my-model", "system": "be nice", "messages": []});
		assert_eq!(detect("/unknown", &body), Dialect::Claude);

		let body = json!({"model": "my-model", "messages": [{"role": "assistant", "tool_calls": []}]});
		assert_eq!(detect("/unknown", &body), Dialect::OpenAi);
	}

	#[test]
	fn model_prefix_is_last_resort() {
		let body = json!({"model": "claude-3-5-sonnet-20241022", "messages": []});
		assert_eq!(detect("/unknown", &body), Dialect::Claude);

		let body = json!({"model": "gpt-4o", "messages": []});
		assert_eq!(detect("/unknown", &body), Dialect::OpenAi);
	}

	#[test]
	fn claude_path_downgraded_when_model_is_not_claude_prefixed_and_no_other_signal() {
		// Ambiguous body shape, non-claude model, unknown path: falls back to
		// openai per the downgrade rule (path did not decisively say claude).
		let body = json!({"model": "gpt-4o", "messages": []});
		assert_eq!(detect("/unknown", &body), Dialect::OpenAi);
	}
}
