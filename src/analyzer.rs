//! Reasoning-Effort Analyzer (§4.3). Pure function, no side effects; stable
//! under re-evaluation with the same inputs.

use crate::backend::ReasoningEffort;

/// Keywords that, combined with the presence of a fenced code block, push a
/// request into the "complex" bucket (§4.3: "code block ∧ complexity keyword").
const COMPLEXITY_KEYWORDS: &[&str] = &[
	"architecture",
	"algorithm",
	"optimize",
	"refactor",
	"distributed",
	"concurrency",
	"race condition",
	"performance",
	"scalability",
	"recursive",
];

#[derive(Debug, Clone, Default)]
pub struct AnalyzerInputs {
	pub message_count: usize,
	pub avg_tokens_per_message: Option<f64>,
	pub error_rate: Option<f64>,
	pub avg_prior_response_time_ms: Option<f64>,
	pub reasoning_token_ratio: Option<f64>,
	pub current_request_len_chars: usize,
	pub has_code_block: bool,
	pub has_complexity_keyword: bool,
	pub question_mark_count: usize,
	pub tools_present: bool,
}

impl AnalyzerInputs {
	/// Derives the content-shape signals (code block, complexity keyword,
	/// `?` count, length) from the current request's text.
	pub fn from_request_text(text: &str) -> Self {
		let has_code_block = text.contains("```");
		let lower = text.to_lowercase();
		let has_complexity_keyword = COMPLEXITY_KEYWORDS.iter().any(|k| lower.contains(k));
		let question_mark_count = text.matches('?').count();
		AnalyzerInputs {
			current_request_len_chars: text.chars().count(),
			has_code_block,
			has_complexity_keyword,
			question_mark_count,
			..Default::default()
		}
	}
}

/// Computes effort from the weighted-additive score in §4.3: message count,
/// avg tokens/message, conversation error rate, avg prior response time,
/// reasoning-token ratio, current request content shape, and tool presence.
pub fn analyze(inputs: &AnalyzerInputs) -> ReasoningEffort {
	let mut score: i32 = 0;

	score += if inputs.message_count > 10 {
		3
	} else if inputs.message_count > 5 {
		2
	} else if inputs.message_count > 2 {
		1
	} else {
		0
	};

	if let Some(avg) = inputs.avg_tokens_per_message {
		score += if avg > 2000.0 { 2 } else if avg > 1000.0 { 1 } else { 0 };
	}

	if let Some(rate) = inputs.error_rate {
		score += if rate > 0.2 { 2 } else if rate > 0.1 { 1 } else { 0 };
	}

	if let Some(rt) = inputs.avg_prior_response_time_ms {
		if rt > 10_000.0 {
			score += 1;
		}
	}

	if let Some(ratio) = inputs.reasoning_token_ratio {
		score += if ratio > 0.3 { 2 } else if ratio > 0.1 { 1 } else { 0 };
	}

	let is_complex = inputs.current_request_len_chars > 10_000
		|| (inputs.has_code_block && inputs.has_complexity_keyword)
		|| inputs.question_mark_count > 2;
	if is_complex {
		score += 2;
	} else if inputs.current_request_len_chars > 500 {
		score += 1;
	}

	let mut effort = match score {
		s if s >= 8 => ReasoningEffort::High,
		s if s >= 4 => ReasoningEffort::Medium,
		s if s >= 2 => ReasoningEffort::Low,
		_ => ReasoningEffort::Minimal,
	};

	// Tools present → at least `medium` (§4.3).
	if inputs.tools_present {
		effort = effort.max(ReasoningEffort::Medium);
	}

	effort
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn minimal_for_trivial_request() {
		let inputs = AnalyzerInputs { message_count: 1, current_request_len_chars: 10, ..Default::default() };
		assert_eq!(analyze(&inputs), ReasoningEffort::Minimal);
	}

	#[test]
	fn high_when_many_signals_combine() {
		let inputs = AnalyzerInputs {
			message_count: 12,
			avg_tokens_per_message: Some(2500.0),
			error_rate: Some(0.25),
			..Default::default()
		};
		assert_eq!(analyze(&inputs), ReasoningEffort::High);
	}

	#[test]
	fn tools_present_raises_floor_to_medium() {
		let inputs = AnalyzerInputs { message_count: 1, tools_present: true, ..Default::default() };
		assert_eq!(analyze(&inputs), ReasoningEffort::Medium);
	}

	#[test]
	fn code_block_with_complexity_keyword_is_complex() {
		let text = "```rust\nfn x() {}\n```\nhow do I optimize this?";
		let inputs = AnalyzerInputs::from_request_text(text);
		assert!(inputs.has_code_block);
		assert!(inputs.has_complexity_keyword);
		assert_eq!(analyze(&inputs), ReasoningEffort::Low);
	}

	#[test]
	fn stable_under_reevaluation() {
		let inputs = AnalyzerInputs { message_count: 6, tools_present: true, ..Default::default() };
		assert_eq!(analyze(&inputs), analyze(&inputs));
	}
}
