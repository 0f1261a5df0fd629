//! Graceful-Degradation Hook (§4.10): on a retryable-exhausted, `Upstream5xx`,
//! or `Unknown` failure, synthesizes a caller-dialect fallback body instead of
//! surfacing the error. Never triggers on a 4xx-classified kind (validation,
//! auth, not-found, rate-limit) — those flow straight to the Error Mapper.

use serde_json::json;

use crate::dialect::Dialect;
use crate::error::{FailureKind, GatewayError};
use crate::strng::Strng;

const FALLBACK_APOLOGY: &str = "I'm unable to complete this request right now. Please try again in a moment.";

fn is_degrade_eligible(kind: FailureKind) -> bool {
	matches!(kind, FailureKind::Network | FailureKind::Timeout | FailureKind::Upstream5xx | FailureKind::Unknown)
}

/// Returns a synthesized fallback body for an eligible failure, or `None` if
/// the error should flow through to the Error Mapper unchanged.
pub fn try_degrade(err: &GatewayError, dialect: Dialect, correlation_id: &Strng) -> Option<serde_json::Value> {
	if !is_degrade_eligible(err.kind()) {
		return None;
	}
	Some(match dialect {
		Dialect::Claude => claude_fallback(correlation_id),
		Dialect::OpenAi => openai_fallback(correlation_id),
	})
}

fn claude_fallback(correlation_id: &Strng) -> serde_json::Value {
	json!({
		"id": format!("fallback-{correlation_id}"),
		"type": "message",
		"role": "assistant",
		"content": [{"type": "text", "text": FALLBACK_APOLOGY}],
		"stop_reason": "end_turn",
		"usage": {"input_tokens": 0, "output_tokens": 0},
		"correlationId": correlation_id.as_str(),
		"degraded": true,
	})
}

fn openai_fallback(correlation_id: &Strng) -> serde_json::Value {
	json!({
		"id": format!("fallback-{correlation_id}"),
		"object": "chat.completion",
		"created": 0,
		"choices": [{"index": 0, "message": {"role": "assistant", "content": FALLBACK_APOLOGY}, "finish_reason": "stop"}],
		"usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0},
		"correlationId": correlation_id.as_str(),
		"degraded": true,
	})
}
