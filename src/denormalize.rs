//! Response Denormalizer (§4.8): neutral `ResponsesResponse` /
//! `ResponsesStreamChunk` back into the caller's dialect. Reasoning output is
//! never surfaced in a final visible body or in a streamed delta — the
//! reference policy is that it stays internal to the backend exchange.

use serde_json::json;

use crate::backend::{FinishIndicator, ResponseOutput, ResponsesResponse, StreamOutputDelta};
use crate::strng::Strng;

/// Assembles the text the caller sees from the neutral output list, skipping
/// `Reasoning` entries.
fn visible_text(output: &[ResponseOutput]) -> String {
	output
		.iter()
		.filter_map(|o| match o {
			ResponseOutput::Text { text } => Some(text.as_str()),
			_ => None,
		})
		.collect::<Vec<_>>()
		.join("")
}

fn has_tool_call(output: &[ResponseOutput]) -> bool {
	output.iter().any(|o| matches!(o, ResponseOutput::ToolCall { .. }))
}

pub mod claude {
	use super::*;

	/// Builds a Claude `messages` response body (§4.8).
	pub fn denormalize(resp: &ResponsesResponse, correlation_id: &Strng) -> serde_json::Value {
		let mut content = Vec::new();
		let text = visible_text(&resp.output);
		if !text.is_empty() {
			content.push(json!({"type": "text", "text": text}));
		}
		for output in &resp.output {
			if let ResponseOutput::ToolCall { id, name, arguments } = output {
				content.push(json!({"type": "tool_use", "id": id, "name": name, "input": arguments}));
			}
		}

		let stop_reason = if has_tool_call(&resp.output) {
			"tool_use"
		} else {
			match resp.finish_indicator {
				Some(FinishIndicator::Length) => "max_tokens",
				_ => "end_turn",
			}
		};

		json!({
			"id": resp.id.as_str(),
			"type": "message",
			"role": "assistant",
			"model": resp.model.as_str(),
			"content": content,
			"stop_reason": stop_reason,
			"usage": {
				"input_tokens": resp.usage.prompt_tokens,
				"output_tokens": resp.usage.completion_tokens,
			},
			"correlationId": correlation_id.as_str(),
		})
	}

	/// Dialect-framed SSE events for one stream chunk (§4.9): named events
	/// `message_start`, `content_block_start`/`delta`/`stop`, `message_stop`.
	/// Returns `(event_name, data)` pairs to be written in order.
	pub fn denormalize_chunk_events(
		chunk: &crate::backend::ResponsesStreamChunk,
		is_first: bool,
		is_last: bool,
	) -> Vec<(&'static str, serde_json::Value)> {
		let mut events = Vec::new();
		if is_first {
			events.push(("message_start", json!({"type": "message_start", "message": {"id": chunk.id.as_str(), "role": "assistant", "model": chunk.model.as_str(), "content": []}})));
			events.push(("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})));
		}
		for delta in &chunk.output {
			if let StreamOutputDelta::TextDelta { text } = delta {
				events.push(("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})));
			}
			// Reasoning deltas and tool-call fragments intentionally produce no
			// Claude SSE event in this mapping (§4.8: reasoning never leaks).
		}
		if is_last {
			events.push(("content_block_stop", json!({"type": "content_block_stop", "index": 0})));
			events.push(("message_stop", json!({"type": "message_stop"})));
		}
		events
	}
}

pub mod openai {
	use super::*;

	/// Builds an OpenAI `chat.completion` response body (§4.8).
	pub fn denormalize(resp: &ResponsesResponse, correlation_id: &Strng) -> serde_json::Value {
		let text = visible_text(&resp.output);
		let tool_calls: Vec<_> = resp
			.output
			.iter()
			.filter_map(|o| match o {
				ResponseOutput::ToolCall { id, name, arguments } => Some(json!({
					"id": id,
					"type": "function",
					"function": {"name": name, "arguments": arguments.to_string()},
				})),
				_ => None,
			})
			.collect();

		let finish_reason = if has_tool_call(&resp.output) { "tool_calls" } else { "stop" };

		let mut message = json!({"role": "assistant", "content": text});
		if !tool_calls.is_empty() {
			message["tool_calls"] = json!(tool_calls);
		}

		json!({
			"id": resp.id.as_str(),
			"object": "chat.completion",
			"created": resp.created,
			"model": resp.model.as_str(),
			"choices": [{"index": 0, "message": message, "finish_reason": finish_reason}],
			"usage": {
				"prompt_tokens": resp.usage.prompt_tokens,
				"completion_tokens": resp.usage.completion_tokens,
				"total_tokens": resp.usage.total_tokens,
			},
			"correlationId": correlation_id.as_str(),
		})
	}

	/// Unnamed `data:` chunk bodies; the caller is responsible for emitting
	/// the terminating `data: [DONE]` line after the last one (§4.9).
	pub fn denormalize_chunk(chunk: &crate::backend::ResponsesStreamChunk, is_last: bool) -> serde_json::Value {
		let mut delta = json!({});
		for d in &chunk.output {
			if let StreamOutputDelta::TextDelta { text } = d {
				delta["content"] = json!(text);
			}
			// Reasoning deltas are omitted: OpenAI has no standard field for them.
		}
		let finish_reason = if is_last {
			match chunk.finish_indicator {
				Some(FinishIndicator::ToolUse) => json!("tool_calls"),
				Some(FinishIndicator::Length) => json!("length"),
				_ => json!("stop"),
			}
		} else {
			serde_json::Value::Null
		};

		json!({
			"id": chunk.id.as_str(),
			"object": "chat.completion.chunk",
			"created": chunk.created,
			"model": chunk.model.as_str(),
			"choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::{FinishIndicator, Usage};
	use crate::strng;

	fn sample_response(output: Vec<ResponseOutput>) -> ResponsesResponse {
		ResponsesResponse {
			id: strng::new("resp-1"),
			created: 0,
			model: strng::new("claude-3-5-sonnet-20241022"),
			output,
			usage: Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15, reasoning_tokens: Some(3) },
			finish_indicator: Some(FinishIndicator::Stop),
		}
	}

	#[test]
	fn claude_reasoning_is_never_surfaced_in_visible_content() {
		let resp = sample_response(vec![
			ResponseOutput::Reasoning { content: "secret chain of thought".into(), status: crate::backend::ReasoningStatus::Completed },
			ResponseOutput::Text { text: "the answer is 42".into() },
		]);
		let body = claude::denormalize(&resp, &strng::new("corr-1"));
		let rendered = body.to_string();
		assert!(!rendered.contains("secret chain of thought"));
		assert!(rendered.contains("the answer is 42"));
	}

	#[test]
	fn claude_tool_call_sets_stop_reason_tool_use() {
		let resp = sample_response(vec![ResponseOutput::ToolCall { id: "t1".into(), name: "lookup".into(), arguments: json!({}) }]);
		let body = claude::denormalize(&resp, &strng::new("corr-1"));
		assert_eq!(body["stop_reason"], "tool_use");
	}

	#[test]
	fn openai_finish_reason_is_tool_calls_when_tool_call_present() {
		let resp = sample_response(vec![ResponseOutput::ToolCall { id: "t1".into(), name: "lookup".into(), arguments: json!({}) }]);
		let body = openai::denormalize(&resp, &strng::new("corr-1"));
		assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
	}

	#[test]
	fn openai_usage_fields_are_verbatim() {
		let resp = sample_response(vec![ResponseOutput::Text { text: "hi".into() }]);
		let body = openai::denormalize(&resp, &strng::new("corr-1"));
		assert_eq!(body["usage"]["total_tokens"], 15);
	}
}
