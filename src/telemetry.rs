//! Tracing subscriber setup (§6 ambient addendum), matching the teacher's
//! `RawLogging`/`RawLoggingFields` config shape (`crates/agentgateway/src/lib.rs`)
//! in spirit, scaled down to what this gateway actually needs: an `EnvFilter`
//! driven by `RUST_LOG` and a choice between human-readable and JSON output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Installs the global `tracing` subscriber. Call once, at process start.
pub fn init(env_filter: &str, format: LogFormat) {
	let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);

	match format {
		LogFormat::Json => {
			registry.with(tracing_subscriber::fmt::layer().json().with_target(true)).init();
		}
		LogFormat::Text => {
			registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
		}
	}
}

/// The fields every request-scoped span carries (§9: correlation id on every
/// request span; `provider`/`operation` on every backend-call span). No
/// secret-bearing field is ever recorded here.
pub fn request_span(correlation_id: &str, dialect: &str, path: &str) -> tracing::Span {
	tracing::info_span!("request", correlation_id, dialect, path)
}

pub fn backend_call_span(provider: &str, operation: &str) -> tracing::Span {
	tracing::info_span!("backend_call", provider, operation)
}
