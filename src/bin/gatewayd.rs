//! Demonstration binary: wires a `Gateway` behind an `axum` HTTP surface
//! (§6). Reads configuration once at start, binds `GATEWAY_BIND_ADDR`, and
//! serves `/v1/messages`, `/v1/chat/completions`, `/v1/completions`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use llm_gateway::config::Config;
use llm_gateway::{telemetry, Gateway};

const CONVERSATION_CLEANUP_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = Config::load()?;
	telemetry::init(config.logging.env_filter.as_str(), config.logging.format);

	let bind_addr = config.bind_addr.to_string();
	let body_limit = config.request_body_limit_bytes;
	let cleanup_interval = config.conversation.cleanup_interval;

	let gateway = Arc::new(Gateway::new(&config)?);
	let shutdown = CancellationToken::new();
	gateway.spawn_conversation_cleanup(cleanup_interval, shutdown.clone());

	let app = Router::new()
		.route("/v1/messages", post(handle_request))
		.route("/v1/chat/completions", post(handle_request))
		.route("/v1/completions", post(handle_request))
		.layer(DefaultBodyLimit::max(body_limit))
		.layer(CorsLayer::permissive())
		.with_state(gateway.clone());

	tracing::info!(%bind_addr, "starting llm-gateway");
	let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown.clone())).await?;

	gateway.shutdown(CONVERSATION_CLEANUP_GRACE).await;
	Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
	let _ = tokio::signal::ctrl_c().await;
	shutdown.cancel();
}

async fn handle_request(State(gateway): State<Arc<Gateway>>, uri: Uri, headers: HeaderMap, body: axum::body::Bytes) -> Response {
	let body: serde_json::Value = match serde_json::from_slice(&body) {
		Ok(v) => v,
		Err(_) => return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "request body must be valid JSON"}))).into_response(),
	};

	let wants_stream = body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);
	let cancel = CancellationToken::new();

	if wants_stream {
		match gateway.handle_stream(uri.path(), body, &headers, cancel).await {
			Ok((sse_headers, sse)) => (sse_headers, sse).into_response(),
			Err(outcome) => (StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(outcome.body)).into_response(),
		}
	} else {
		let outcome = gateway.handle_unary(uri.path(), body, &headers, cancel).await;
		(StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(outcome.body)).into_response()
	}
}
