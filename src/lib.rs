//! Crate root: wires the components from §4 into a `Gateway` that an HTTP
//! handler drives (see `bin/gatewayd.rs`). Owns the three process-wide
//! singletons admitted by §9: the Conversation Store, the Breaker Registry
//! (inside `ResilienceLayer`), and each backend client's connection pool.

pub mod analyzer;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod correlation;
pub mod degrade;
pub mod denormalize;
pub mod dialect;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod resilience;
pub mod router;
pub mod sanitize;
pub mod streaming;
pub mod strng;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use backend::azure::AzureClient;
use backend::bedrock::BedrockClient;
use backend::BackendClient;
use config::Config;
use conversation::{ConversationStore, MetricsDelta};
use correlation::CorrelationId;
use dialect::Dialect;
use error::GatewayError;
use resilience::retry::RetryConfig;
use resilience::ResilienceLayer;
use router::{Provider, RoutingTable};
use strng::Strng;

pub struct UnaryOutcome {
	pub status: u16,
	pub body: serde_json::Value,
}

struct PreparedRequest {
	conversation_id: Strng,
	requested_model: Strng,
	request: backend::ResponsesRequest,
	client: Arc<dyn BackendClient>,
	provider_name: Strng,
}

/// The wired-up gateway. One instance per process; cheap to share behind an
/// `Arc` across request-handling tasks.
pub struct Gateway {
	pub conversations: Arc<ConversationStore>,
	pub resilience: ResilienceLayer,
	pub routing: RoutingTable,
	pub metrics: metrics::Metrics,
	content_security_validation_enabled: bool,
	graceful_degradation_enabled: bool,
	azure: Option<Arc<AzureClient>>,
	bedrock: Option<Arc<BedrockClient>>,
}

impl Gateway {
	pub fn new(config: &Config) -> Result<Self, GatewayError> {
		let azure = config.azure.clone().map(AzureClient::new).transpose()?.map(Arc::new);
		let bedrock = config.bedrock.clone().map(BedrockClient::new).transpose()?.map(Arc::new);

		let default_provider = if azure.is_some() { Provider::Azure } else { Provider::Bedrock };
		let default_model = config
			.azure
			.as_ref()
			.and_then(|a| a.model_deployment.clone())
			.or_else(|| config.bedrock.as_ref().and_then(|b| b.model_override.clone()))
			.unwrap_or_else(|| strng::literal!("default"));

		Ok(Gateway {
			conversations: Arc::new(ConversationStore::new(config.conversation.max_age, config.conversation.max_stored_conversations)),
			resilience: ResilienceLayer::new(config.breaker, RetryConfig::default()),
			routing: RoutingTable { entries: Vec::new(), default_provider, default_model },
			metrics: metrics::Metrics::new(),
			content_security_validation_enabled: config.content_security_validation_enabled,
			graceful_degradation_enabled: config.graceful_degradation_enabled,
			azure,
			bedrock,
		})
	}

	fn backend_configured(&self, provider: Provider) -> bool {
		match provider {
			Provider::Azure => self.azure.is_some(),
			Provider::Bedrock => self.bedrock.is_some(),
		}
	}

	fn client_for(&self, provider: Provider) -> Result<Arc<dyn BackendClient>, GatewayError> {
		match provider {
			Provider::Azure => self.azure.clone().map(|c| c as Arc<dyn BackendClient>),
			Provider::Bedrock => self.bedrock.clone().map(|c| c as Arc<dyn BackendClient>),
		}
		.ok_or_else(|| GatewayError::validation("provider", "requested provider is not configured"))
	}

	/// Runs the Format Detector, Normalizer, Model Router, and conversation
	/// lookup. Returns the dialect and correlation id unconditionally (even on
	/// failure) so the caller can still build a properly-shaped error envelope.
	fn prepare(&self, path: &str, body: serde_json::Value, headers: &http::HeaderMap) -> (Dialect, CorrelationId, Result<PreparedRequest, GatewayError>) {
		let dialect = dialect::detect(path, &body);
		let correlation_id = CorrelationId::new();
		let result = (|| -> Result<PreparedRequest, GatewayError> {
			let normalized = dialect::normalize_wire(dialect, body)?;
			let conversation_id = ConversationStore::extract_conversation_id(headers, correlation_id.as_str());
			let prior = self.conversations.get_entry(&conversation_id);
			let mut request = normalize::normalize(&normalized, prior.as_ref(), self.content_security_validation_enabled)?;
			let decision = self.routing.route(request.model.as_str(), |p| self.backend_configured(p))?;
			let client = self.client_for(decision.provider)?;
			let provider_name = client.name();
			request.model = decision.backend_model;
			Ok(PreparedRequest { conversation_id, requested_model: decision.requested_model, request, client, provider_name })
		})();
		(dialect, correlation_id, result)
	}

	fn finish_error(&self, dialect: Dialect, correlation_id: &CorrelationId, err: &GatewayError) -> UnaryOutcome {
		self.metrics.record_error();
		if self.graceful_degradation_enabled {
			if let Some(body) = degrade::try_degrade(err, dialect, &strng::new(correlation_id.as_str())) {
				tracing::warn!(correlation_id = correlation_id.as_str(), error = %err, "graceful degradation hook intercepted error response");
				self.metrics.record_degraded_response();
				return UnaryOutcome { status: 200, body };
			}
		}
		let (status, envelope) = error::map_error(err, dialect, correlation_id);
		let body = serde_json::to_value(envelope).unwrap_or_else(|_| serde_json::json!({"error": "failed to serialize error envelope"}));
		UnaryOutcome { status, body }
	}

	/// Unary request path (§4.1-§4.8, §4.10, §4.11 minus streaming).
	pub async fn handle_unary(&self, path: &str, body: serde_json::Value, headers: &http::HeaderMap, cancel: CancellationToken) -> UnaryOutcome {
		self.metrics.record_request();
		let (dialect, correlation_id, prepared) = self.prepare(path, body, headers);
		let prepared = match prepared {
			Ok(p) => p,
			Err(err) => return self.finish_error(dialect, &correlation_id, &err),
		};

		let operation = strng::literal!("createResponse");
		let client = prepared.client.clone();
		let req = prepared.request.clone();
		let cancel_outer = cancel.clone();
		let cancel_inner = cancel.clone();
		let (result, outcome) = self
			.resilience
			.call(&prepared.provider_name, &operation, &cancel_outer, move |_attempt| {
				let client = client.clone();
				let req = req.clone();
				let cancel = cancel_inner.clone();
				async move { client.create_response(&req, cancel).await }
			})
			.await;
		for _ in 0..outcome.retry.attempts.saturating_sub(1) {
			self.metrics.record_retry();
		}
		if outcome.circuit_tripped {
			self.metrics.record_circuit_trip();
		}

		match result {
			Ok(mut resp) => {
				resp.model = prepared.requested_model;
				let delta = MetricsDelta {
					tokens: resp.usage.total_tokens,
					reasoning_tokens: resp.usage.reasoning_tokens.unwrap_or(0),
					response_time_ms: 0,
					is_error: false,
				};
				self.conversations.track(&prepared.conversation_id, resp.id.clone(), delta);
				let correlation = strng::new(correlation_id.as_str());
				let body = match dialect {
					Dialect::Claude => denormalize::claude::denormalize(&resp, &correlation),
					Dialect::OpenAi => denormalize::openai::denormalize(&resp, &correlation),
				};
				UnaryOutcome { status: 200, body }
			}
			Err(err) => {
				self.conversations.update_metrics(&prepared.conversation_id, MetricsDelta { is_error: true, ..Default::default() });
				self.finish_error(dialect, &correlation_id, &err)
			}
		}
	}

	/// Streaming request path (§4.9). Returns the framed SSE response on
	/// success, or an `UnaryOutcome` carrying a JSON error body when the
	/// stream could not even be established (no bytes have been written yet).
	pub async fn handle_stream(
		&self,
		path: &str,
		body: serde_json::Value,
		headers: &http::HeaderMap,
		cancel: CancellationToken,
	) -> Result<streaming::SseResponse, UnaryOutcome> {
		self.metrics.record_request();
		let (dialect, correlation_id, prepared) = self.prepare(path, body, headers);
		let prepared = match prepared {
			Ok(p) => p,
			Err(err) => return Err(self.finish_error(dialect, &correlation_id, &err)),
		};

		self.metrics.record_stream_session();
		let operation = strng::literal!("createResponseStream");
		let client = prepared.client.clone();
		let req = prepared.request.clone();
		let cancel_outer = cancel.clone();
		let cancel_inner = cancel.clone();
		let (result, outcome) = self
			.resilience
			.call(&prepared.provider_name, &operation, &cancel_outer, move |_attempt| {
				let client = client.clone();
				let req = req.clone();
				let cancel = cancel_inner.clone();
				async move { streaming::stream(dialect, client.as_ref(), req, cancel).await }
			})
			.await;
		for _ in 0..outcome.retry.attempts.saturating_sub(1) {
			self.metrics.record_retry();
		}
		if outcome.circuit_tripped {
			self.metrics.record_circuit_trip();
		}

		match result {
			Ok((sse, completed)) => {
				if let Some(mut resp) = completed {
					resp.model = prepared.requested_model;
					let delta = MetricsDelta {
						tokens: resp.usage.total_tokens,
						reasoning_tokens: resp.usage.reasoning_tokens.unwrap_or(0),
						response_time_ms: 0,
						is_error: false,
					};
					self.conversations.track(&prepared.conversation_id, resp.id.clone(), delta);
				}
				Ok(sse)
			}
			Err(err) => {
				self.conversations.update_metrics(&prepared.conversation_id, MetricsDelta { is_error: true, ..Default::default() });
				Err(self.finish_error(dialect, &correlation_id, &err))
			}
		}
	}

	/// Starts the Conversation Store's background eviction sweep (§4.4).
	pub fn spawn_conversation_cleanup(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
		self.conversations.clone().spawn_cleanup_task(interval, shutdown)
	}

	/// Drains in-flight backend resources with a bounded grace period, then
	/// force-disposes the remainder (§5, §9).
	pub async fn shutdown(&self, grace: Duration) {
		if let Some(azure) = &self.azure {
			azure.shutdown(grace).await;
		}
		if let Some(bedrock) = &self.bedrock {
			bedrock.shutdown(grace).await;
		}
	}
}
