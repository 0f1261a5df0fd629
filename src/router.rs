//! Model Router (§4.5): maps a requested model alias to a `(provider,
//! backendModel)` pair using a configured routing table with a default
//! fallback.

use crate::error::GatewayError;
use crate::strng::{self, Strng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
	Azure,
	Bedrock,
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
	pub provider: Provider,
	pub backend_model: Strng,
	pub aliases: Vec<Strng>,
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
	pub entries: Vec<RouteEntry>,
	pub default_provider: Provider,
	pub default_model: Strng,
}

/// §3 `RoutingDecision`.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
	pub provider: Provider,
	pub requested_model: Strng,
	pub backend_model: Strng,
}

impl RoutingTable {
	/// Iterates entries; the first whose `aliases` or `backendModel` contains
	/// the name (case-sensitive, exact match) wins. No match falls back to
	/// `{defaultProvider, defaultModel}` with `requestedModel` preserved for
	/// echo-back (§4.5).
	pub fn route(&self, requested_model: &str, backend_configured: impl Fn(Provider) -> bool) -> Result<RoutingDecision, GatewayError> {
		let requested = strng::new(requested_model);
		let matched = self
			.entries
			.iter()
			.find(|e| e.backend_model.as_str() == requested_model || e.aliases.iter().any(|a| a.as_str() == requested_model));

		let (provider, backend_model) = match matched {
			Some(entry) => (entry.provider, entry.backend_model.clone()),
			None => (self.default_provider, self.default_model.clone()),
		};

		if !backend_configured(provider) {
			return Err(GatewayError::validation("provider", "provider not configured"));
		}

		Ok(RoutingDecision { provider, requested_model: requested, backend_model })
	}
}
