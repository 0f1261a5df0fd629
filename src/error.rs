//! Error taxonomy and mapper (§4.11).
//!
//! `GatewayError` is the sum type every component constructs and propagates.
//! It carries enough structure to classify retryability, circuit-breaker
//! eligibility, and the caller-facing HTTP status without re-inspecting the
//! original cause, per spec.md §4.11 / §7.

use std::time::Duration;

use crate::strng::{self, Strng};

/// The classification tag from the data model (§3 `BackendFailure.kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
	Validation,
	Authentication,
	Authorization,
	NotFound,
	RateLimit,
	Timeout,
	Network,
	Upstream5xx,
	CircuitOpen,
	Canceled,
	Unknown,
}

impl FailureKind {
	/// `retryable = true` iff kind is in `{Timeout, Network, Upstream5xx, RateLimit}` (§3 invariant).
	pub fn retryable(self) -> bool {
		matches!(
			self,
			FailureKind::Timeout | FailureKind::Network | FailureKind::Upstream5xx | FailureKind::RateLimit
		)
	}

	/// Whether the circuit breaker's `expectedErrors` set counts this kind (§4.6 defaults).
	pub fn trips_breaker(self) -> bool {
		matches!(self, FailureKind::Network | FailureKind::Timeout | FailureKind::Upstream5xx)
	}

	/// kind → HTTP status, per §4.11.
	pub fn http_status(self) -> u16 {
		match self {
			FailureKind::Validation => 400,
			FailureKind::Authentication => 401,
			FailureKind::Authorization => 403,
			FailureKind::NotFound => 404,
			FailureKind::RateLimit => 429,
			FailureKind::Timeout => 408,
			FailureKind::Network => 503,
			FailureKind::Upstream5xx => 503,
			FailureKind::CircuitOpen => 503,
			FailureKind::Canceled => 499,
			FailureKind::Unknown => 500,
		}
	}
}

/// The crate-wide error type. One variant per failure family (§3 `BackendFailure`),
/// following the teacher's `AIError` in `llm/mod.rs`: descriptive messages,
/// `#[from]` conversions from the I/O error types we actually touch.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
	#[error("validation failed for {field}: {reason}")]
	Validation { field: Strng, reason: Strng },

	#[error("authentication failed")]
	Authentication,

	#[error("not authorized")]
	Authorization,

	#[error("not found: {0}")]
	NotFound(Strng),

	#[error("rate limited")]
	RateLimit { retry_after: Option<Duration> },

	#[error("request timed out")]
	Timeout,

	#[error("network error: {0}")]
	Network(Strng),

	#[error("upstream returned {status}")]
	Upstream5xx { status: u16, body_excerpt: Strng },

	#[error("circuit open for {provider}/{operation}")]
	CircuitOpen { provider: Strng, operation: Strng },

	#[error("request canceled")]
	Canceled,

	#[error("unclassified error: {0}")]
	Unknown(Strng),

	#[error("failed to encode request: {0}")]
	RequestMarshal(#[source] serde_json::Error),

	#[error("failed to decode response: {0}")]
	ResponseParsing(#[source] serde_json::Error),

	#[error("unsupported conversion to {0}")]
	UnsupportedConversion(Strng),
}

impl GatewayError {
	pub fn kind(&self) -> FailureKind {
		match self {
			GatewayError::Validation { .. } => FailureKind::Validation,
			GatewayError::Authentication => FailureKind::Authentication,
			GatewayError::Authorization => FailureKind::Authorization,
			GatewayError::NotFound(_) => FailureKind::NotFound,
			GatewayError::RateLimit { .. } => FailureKind::RateLimit,
			GatewayError::Timeout => FailureKind::Timeout,
			GatewayError::Network(_) => FailureKind::Network,
			GatewayError::Upstream5xx { .. } => FailureKind::Upstream5xx,
			GatewayError::CircuitOpen { .. } => FailureKind::CircuitOpen,
			GatewayError::Canceled => FailureKind::Canceled,
			GatewayError::Unknown(_)
			| GatewayError::RequestMarshal(_)
			| GatewayError::ResponseParsing(_)
			| GatewayError::UnsupportedConversion(_) => FailureKind::Unknown,
		}
	}

	pub fn retryable(&self) -> bool {
		self.kind().retryable()
	}

	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			GatewayError::RateLimit { retry_after } => *retry_after,
			_ => None,
		}
	}

	pub fn validation(field: impl AsRef<str>, reason: impl AsRef<str>) -> Self {
		GatewayError::Validation {
			field: strng::new(field),
			reason: strng::new(reason),
		}
	}

	/// Sanitizes the display message before it is exposed to a caller (§4.11, §8 property 9):
	/// redacts bearer tokens, api-key-shaped strings, backend URLs, emails, long opaque
	/// tokens, and digit runs that look like card/SSN numbers.
	pub fn sanitized_message(&self) -> String {
		crate::sanitize::redact(&self.to_string())
	}
}

impl From<reqwest::Error> for GatewayError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_timeout() {
			GatewayError::Timeout
		} else if e.is_connect() {
			GatewayError::Network(strng::new(crate::sanitize::redact(&e.to_string())))
		} else if let Some(status) = e.status() {
			GatewayError::Upstream5xx {
				status: status.as_u16(),
				body_excerpt: strng::new(crate::sanitize::redact(&e.to_string())),
			}
		} else {
			GatewayError::Unknown(strng::new(crate::sanitize::redact(&e.to_string())))
		}
	}
}

impl From<tokio::time::error::Elapsed> for GatewayError {
	fn from(_: tokio::time::error::Elapsed) -> Self {
		GatewayError::Timeout
	}
}

/// The caller-facing error envelope (§4.11, §6). Every response carries the
/// correlation id and a timestamp, whether success or failure.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum ErrorEnvelope {
	Claude {
		#[serde(rename = "type")]
		ty: &'static str,
		error: ClaudeErrorBody,
		correlation_id: Strng,
		timestamp: chrono::DateTime<chrono::Utc>,
	},
	OpenAi {
		error: OpenAiErrorBody,
		correlation_id: Strng,
		timestamp: chrono::DateTime<chrono::Utc>,
	},
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClaudeErrorBody {
	#[serde(rename = "type")]
	pub ty: String,
	pub message: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OpenAiErrorBody {
	pub message: String,
	#[serde(rename = "type")]
	pub ty: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub param: Option<String>,
}

/// Maps a classified error to the caller's dialect envelope (§4.11).
pub fn map_error(
	err: &GatewayError,
	dialect: crate::dialect::Dialect,
	correlation_id: &crate::correlation::CorrelationId,
) -> (u16, ErrorEnvelope) {
	let status = err.kind().http_status();
	let message = err.sanitized_message();
	let envelope = match dialect {
		crate::dialect::Dialect::Claude => ErrorEnvelope::Claude {
			ty: "error",
			error: ClaudeErrorBody {
				ty: claude_error_type(err.kind()).to_string(),
				message,
			},
			correlation_id: strng::new(correlation_id.as_str()),
			timestamp: chrono::Utc::now(),
		},
		crate::dialect::Dialect::OpenAi => ErrorEnvelope::OpenAi {
			error: OpenAiErrorBody {
				message,
				ty: openai_error_type(err.kind()).to_string(),
				code: None,
				param: None,
			},
			correlation_id: strng::new(correlation_id.as_str()),
			timestamp: chrono::Utc::now(),
		},
	};
	(status, envelope)
}

fn claude_error_type(kind: FailureKind) -> &'static str {
	match kind {
		FailureKind::Validation => "invalid_request_error",
		FailureKind::Authentication => "authentication_error",
		FailureKind::Authorization => "permission_error",
		FailureKind::NotFound => "not_found_error",
		FailureKind::RateLimit => "rate_limit_error",
		FailureKind::Timeout
		| FailureKind::Network
		| FailureKind::Upstream5xx
		| FailureKind::CircuitOpen
		| FailureKind::Unknown => "api_error",
		FailureKind::Canceled => "cancelled_error",
	}
}

fn openai_error_type(kind: FailureKind) -> &'static str {
	match kind {
		FailureKind::Validation => "invalid_request_error",
		FailureKind::Authentication => "authentication_error",
		FailureKind::Authorization => "permission_error",
		FailureKind::NotFound => "not_found_error",
		FailureKind::RateLimit => "rate_limit_error",
		FailureKind::Canceled => "cancelled_error",
		_ => "api_error",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn retryable_kinds_match_spec() {
		assert!(FailureKind::Timeout.retryable());
		assert!(FailureKind::Network.retryable());
		assert!(FailureKind::Upstream5xx.retryable());
		assert!(FailureKind::RateLimit.retryable());
		assert!(!FailureKind::Validation.retryable());
		assert!(!FailureKind::Authentication.retryable());
		assert!(!FailureKind::CircuitOpen.retryable());
		assert!(!FailureKind::Canceled.retryable());
	}

	#[test]
	fn status_mapping_matches_spec_table() {
		assert_eq!(FailureKind::Validation.http_status(), 400);
		assert_eq!(FailureKind::Authentication.http_status(), 401);
		assert_eq!(FailureKind::Authorization.http_status(), 403);
		assert_eq!(FailureKind::NotFound.http_status(), 404);
		assert_eq!(FailureKind::RateLimit.http_status(), 429);
		assert_eq!(FailureKind::Timeout.http_status(), 408);
		assert_eq!(FailureKind::Network.http_status(), 503);
		assert_eq!(FailureKind::Upstream5xx.http_status(), 503);
		assert_eq!(FailureKind::CircuitOpen.http_status(), 503);
		assert_eq!(FailureKind::Canceled.http_status(), 499);
		assert_eq!(FailureKind::Unknown.http_status(), 500);
	}

	#[test]
	fn breaker_only_counts_expected_kinds() {
		assert!(FailureKind::Network.trips_breaker());
		assert!(FailureKind::Timeout.trips_breaker());
		assert!(FailureKind::Upstream5xx.trips_breaker());
		assert!(!FailureKind::RateLimit.trips_breaker());
		assert!(!FailureKind::Validation.trips_breaker());
	}
}
