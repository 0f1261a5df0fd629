use crate::strng::{self, Strng};

/// Opaque per-request identifier, carried through every log line, error
/// envelope, and SSE frame for cross-component tracing.
///
/// Created at request entry; dropped once the response has been sent. Never
/// reused across requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CorrelationId(Strng);

impl CorrelationId {
	pub fn new() -> Self {
		Self(strng::new(uuid::Uuid::new_v4().simple().to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for CorrelationId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<Strng> for CorrelationId {
	fn from(value: Strng) -> Self {
		Self(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unique_per_call() {
		let a = CorrelationId::new();
		let b = CorrelationId::new();
		assert_ne!(a, b);
	}

	#[test]
	fn displays_as_raw_string() {
		let id = CorrelationId::from(strng::new("abc123"));
		assert_eq!(id.to_string(), "abc123");
	}
}
