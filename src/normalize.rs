//! Request Normalizer (§4.2): turns a dialect-tagged `NormalizedRequest`
//! into the neutral `ResponsesRequest` every backend consumes. Implemented
//! as a `Normalize` trait per dialect, following the teacher's per-variant
//! dispatch idiom (`llm/conversion/*.rs`) rather than one large match.

use crate::analyzer::{self, AnalyzerInputs};
use crate::backend::{
	NeutralMessage, NeutralTool, NeutralToolChoice, ReasoningEffort, ResponsesInput, ResponsesRequest,
};
use crate::conversation::ConversationEntry;
use crate::dialect::{claude, openai, Dialect, NormalizedRequest};
use crate::error::GatewayError;
use crate::sanitize;
use crate::strng::{self, Strng};

/// Implemented once per caller-facing dialect; `normalize::normalize` is the
/// single entry point callers use.
pub trait Normalize {
	fn normalize(&self, prior: Option<&ConversationEntry>, sanitize_enabled: bool) -> Result<ResponsesRequest, GatewayError>;
}

pub fn normalize(req: &NormalizedRequest, prior: Option<&ConversationEntry>, sanitize_enabled: bool) -> Result<ResponsesRequest, GatewayError> {
	match req {
		NormalizedRequest::Claude(r) => r.normalize(prior, sanitize_enabled),
		NormalizedRequest::OpenAi(r) => r.normalize(prior, sanitize_enabled),
	}
}

/// Applies the content-security sanitization pass when enabled (§4.2:
/// "configurable; disabled in dev"); when disabled, content passes through
/// verbatim but the empty-content placeholder is still substituted so
/// downstream schemas never see an empty string either way.
fn apply_sanitization(text: &str, enabled: bool) -> String {
	if enabled {
		sanitize::sanitize_content(text)
	} else if text.trim().is_empty() {
		sanitize::SANITIZATION_PLACEHOLDER.to_string()
	} else {
		text.to_string()
	}
}

/// Flattens prior conversation metrics plus the current request's raw text
/// into the signals the Analyzer scores (§4.3).
fn analyzer_inputs(raw_text: &str, tools_present: bool, prior: Option<&ConversationEntry>) -> AnalyzerInputs {
	let mut inputs = AnalyzerInputs::from_request_text(raw_text);
	inputs.tools_present = tools_present;
	if let Some(entry) = prior {
		let m = &entry.metrics;
		inputs.message_count = m.message_count as usize;
		if m.message_count > 0 {
			inputs.avg_tokens_per_message = Some(m.total_tokens as f64 / m.message_count as f64);
			inputs.error_rate = Some(m.error_count as f64 / m.message_count as f64);
		}
		inputs.avg_prior_response_time_ms = Some(m.avg_response_time_ms);
		if m.total_tokens > 0 {
			inputs.reasoning_token_ratio = Some(m.reasoning_tokens as f64 / m.total_tokens as f64);
		}
	}
	inputs
}

fn resolve_effort(caller_hint: Option<ReasoningEffort>, inputs: &AnalyzerInputs) -> ReasoningEffort {
	let analyzed = analyzer::analyze(inputs);
	caller_hint.unwrap_or_default().floor_raised_by(analyzed)
}

impl Normalize for claude::ClaudeRequest {
	fn normalize(&self, prior: Option<&ConversationEntry>, sanitize_enabled: bool) -> Result<ResponsesRequest, GatewayError> {
		let mut raw_text = String::new();
		let mut neutral_messages = Vec::new();
		let mut tools_present = self.tools.as_ref().map(|t| !t.is_empty()).unwrap_or(false);

		if let Some(system) = &self.system {
			let text = content_value_to_text(system);
			raw_text.push_str(&text);
			raw_text.push('\n');
			neutral_messages.push(NeutralMessage { role: strng::literal!("system"), content: apply_sanitization(&text, sanitize_enabled) });
		}

		for m in &self.messages {
			let text = content_value_to_text(&m.content);
			if content_has_tool_use(&m.content) {
				tools_present = true;
			}
			raw_text.push_str(&text);
			raw_text.push('\n');
			neutral_messages.push(NeutralMessage { role: role_to_strng(&m.role), content: apply_sanitization(&text, sanitize_enabled) });
		}

		let input = collapse_single_user_turn(&neutral_messages).unwrap_or(ResponsesInput::Messages(neutral_messages));

		let tools = self
			.tools
			.clone()
			.unwrap_or_default()
			.into_iter()
			.map(|t| NeutralTool { name: strng::new(t.name), description: t.description, parameters: t.input_schema })
			.collect();

		let tool_choice = self.tool_choice.as_ref().map(|tc| match tc {
			claude::ToolChoice::Auto | claude::ToolChoice::Any => NeutralToolChoice::Auto,
			claude::ToolChoice::Tool { name } => NeutralToolChoice::Tool { name: strng::new(name) },
		});

		let inputs = analyzer_inputs(&raw_text, tools_present, prior);
		let reasoning_effort = resolve_effort(None, &inputs);

		Ok(ResponsesRequest {
			model: strng::new(&self.model),
			input,
			reasoning_effort,
			max_output_tokens: Some(self.max_tokens),
			temperature: self.temperature,
			top_p: self.top_p,
			stream: self.stream.unwrap_or(false),
			previous_response_id: prior.and_then(|e| e.previous_response_id.clone()),
			tools,
			tool_choice,
			stop: self.stop_sequences.clone().unwrap_or_default(),
			response_format: None,
		})
	}
}

fn role_to_strng(role: &claude::Role) -> Strng {
	match role {
		claude::Role::User => strng::literal!("user"),
		claude::Role::Assistant => strng::literal!("assistant"),
		claude::Role::System => strng::literal!("system"),
		claude::Role::Tool => strng::literal!("tool"),
	}
}

fn content_value_to_text(value: &claude::ContentValue) -> String {
	match value {
		claude::ContentValue::Text(s) => s.clone(),
		claude::ContentValue::Blocks(blocks) => blocks.iter().map(content_block_to_text).collect::<Vec<_>>().join("\n"),
	}
}

fn content_block_to_text(block: &claude::ContentBlock) -> String {
	match block {
		claude::ContentBlock::Text { text } => text.clone(),
		claude::ContentBlock::ToolUse { name, input, .. } => format!("[Tool Call: {name}({input})]"),
		claude::ContentBlock::ToolResult { tool_use_id, content } => {
			let body = content.as_ref().map(content_value_to_text).unwrap_or_default();
			format!("[Tool Result for {tool_use_id}]: {body}")
		}
	}
}

fn content_has_tool_use(value: &claude::ContentValue) -> bool {
	match value {
		claude::ContentValue::Text(_) => false,
		claude::ContentValue::Blocks(blocks) => blocks.iter().any(|b| matches!(b, claude::ContentBlock::ToolUse { .. })),
	}
}

impl Normalize for openai::OpenAiRequest {
	fn normalize(&self, prior: Option<&ConversationEntry>, sanitize_enabled: bool) -> Result<ResponsesRequest, GatewayError> {
		let mut raw_text = String::new();
		let mut neutral_messages = Vec::new();
		let mut tools_present = self.tools.as_ref().map(|t| !t.is_empty()).unwrap_or(false);

		for m in &self.messages {
			let mut text = m.content.clone().unwrap_or_default();
			if let Some(calls) = &m.tool_calls {
				tools_present = true;
				for call in calls {
					text.push_str(&format!("\n[Tool Call: {}({})]", call.function.name, call.function.arguments));
				}
			}
			if let Some(tool_call_id) = &m.tool_call_id {
				text = format!("[Tool Result for {tool_call_id}]: {text}");
			}
			raw_text.push_str(&text);
			raw_text.push('\n');
			neutral_messages.push(NeutralMessage { role: strng::new(&m.role), content: apply_sanitization(&text, sanitize_enabled) });
		}

		let input = collapse_single_user_turn(&neutral_messages).unwrap_or(ResponsesInput::Messages(neutral_messages));

		let tools = self
			.tools
			.clone()
			.unwrap_or_default()
			.into_iter()
			.map(|t| NeutralTool {
				name: strng::new(&t.function.name),
				description: t.function.description,
				parameters: t.function.parameters.unwrap_or(serde_json::json!({})),
			})
			.collect();

		let tool_choice = self.tool_choice.as_ref().and_then(openai_tool_choice_to_neutral);

		let inputs = analyzer_inputs(&raw_text, tools_present, prior);
		let reasoning_effort = resolve_effort(None, &inputs);

		Ok(ResponsesRequest {
			model: strng::new(&self.model),
			input,
			reasoning_effort,
			max_output_tokens: self.max_tokens,
			temperature: self.temperature,
			top_p: self.top_p,
			stream: self.stream.unwrap_or(false),
			previous_response_id: prior.and_then(|e| e.previous_response_id.clone()),
			tools,
			tool_choice,
			stop: self.stop.clone().map(|s| s.into_vec()).unwrap_or_default(),
			response_format: self.response_format.clone(),
		})
	}
}

fn openai_tool_choice_to_neutral(value: &serde_json::Value) -> Option<NeutralToolChoice> {
	if let Some(s) = value.as_str() {
		return match s {
			"auto" | "required" => Some(NeutralToolChoice::Auto),
			_ => None,
		};
	}
	let name = value.get("function").and_then(|f| f.get("name")).and_then(|n| n.as_str())?;
	Some(NeutralToolChoice::Tool { name: strng::new(name) })
}

/// Collapses a single user-only turn with no accompanying system message into
/// a bare-text `ResponsesInput::Text`, per §4.2 ("collapse a lone user turn to
/// a plain string input").
fn collapse_single_user_turn(messages: &[NeutralMessage]) -> Option<ResponsesInput> {
	match messages {
		[only] if only.role.as_str() == "user" => Some(ResponsesInput::Text(only.content.clone())),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn claude_single_user_turn_collapses_to_text() {
		let req = claude::ClaudeRequest::parse(json!({
			"model": "claude-3-5-sonnet-20241022",
			"messages": [{"role": "user", "content": "hello there"}],
			"max_tokens": 50
		}))
		.unwrap();
		let normalized = req.normalize(None, true).unwrap();
		assert!(matches!(normalized.input, ResponsesInput::Text(ref t) if t == "hello there"));
	}

	#[test]
	fn claude_system_message_is_prepended() {
		let req = claude::ClaudeRequest::parse(json!({
			"model": "claude-3-5-sonnet-20241022",
			"system": "be terse",
			"messages": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}],
			"max_tokens": 50
		}))
		.unwrap();
		let normalized = req.normalize(None, true).unwrap();
		match normalized.input {
			ResponsesInput::Messages(msgs) => {
				assert_eq!(msgs[0].role.as_str(), "system");
				assert_eq!(msgs[0].content, "be terse");
			}
			_ => panic!("expected Messages variant"),
		}
	}

	#[test]
	fn sanitization_can_be_disabled_but_placeholder_still_applies() {
		let req = claude::ClaudeRequest::parse(json!({
			"model": "claude-3-5-sonnet-20241022",
			"messages": [{"role": "user", "content": "<script>alert(1)</script>"}],
			"max_tokens": 50
		}))
		.unwrap();
		let sanitized = req.normalize(None, true).unwrap();
		let unsanitized = req.normalize(None, false).unwrap();
		match (sanitized.input, unsanitized.input) {
			(ResponsesInput::Text(s), ResponsesInput::Text(u)) => {
				assert_eq!(s, crate::sanitize::SANITIZATION_PLACEHOLDER);
				assert!(u.contains("<script>"));
			}
			_ => panic!("expected Text variant"),
		}
	}

	#[test]
	fn openai_tool_calls_flatten_into_text_markers() {
		let req = openai::OpenAiRequest::parse(json!({
			"model": "gpt-4o",
			"messages": [
				{"role": "user", "content": "what's the weather"},
				{"role": "assistant", "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "get_weather", "arguments": "{}"}}]}
			]
		}))
		.unwrap();
		let normalized = req.normalize(None, true).unwrap();
		match normalized.input {
			ResponsesInput::Messages(msgs) => {
				assert!(msgs[1].content.contains("[Tool Call: get_weather({})]"));
			}
			_ => panic!("expected Messages variant"),
		}
	}

	#[test]
	fn previous_response_id_is_carried_from_prior_entry() {
		use crate::conversation::ConversationStore;
		let store = ConversationStore::with_defaults();
		let id = strng::new("conv-1");
		store.track(&id, strng::new("resp-1"), Default::default());
		let entry = store.get_entry(&id).unwrap();

		let req = claude::ClaudeRequest::parse(json!({
			"model": "claude-3-5-sonnet-20241022",
			"messages": [{"role": "user", "content": "continue"}],
			"max_tokens": 50
		}))
		.unwrap();
		let normalized = req.normalize(Some(&entry), true).unwrap();
		assert_eq!(normalized.previous_response_id.unwrap().as_str(), "resp-1");
	}
}
