//! Streaming Engine (§4.9): passthrough over a native backend stream, or
//! simulated fragmentation over a unary call. Current policy simulates for
//! both configured backends regardless of `BackendClient::supports_native_streaming`
//! (see DESIGN.md); `choose_mode` is the single place that decision lives,
//! so switching a backend to passthrough later is a one-line change.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendClient, ResponseOutput, ResponseStream, ResponsesRequest, ResponsesResponse, ResponsesStreamChunk, StreamOutputDelta};
use crate::denormalize;
use crate::dialect::Dialect;
use crate::error::GatewayError;

const SIMULATED_CHUNK_COUNT: usize = 5;
const SIMULATED_CHUNK_DELAY: Duration = Duration::from_millis(50);

enum Mode {
	Passthrough,
	Simulated,
}

/// Current policy (§4.9): simulate over every configured backend. Kept as a
/// function of the client so a future passthrough rollout only touches this
/// line, not call sites.
fn choose_mode(_client: &dyn BackendClient) -> Mode {
	Mode::Simulated
}

pub type SseResponse = (HeaderMap, Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>);

fn required_headers() -> HeaderMap {
	let mut headers = HeaderMap::new();
	headers.insert(axum::http::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
	headers.insert(axum::http::header::CONNECTION, HeaderValue::from_static("keep-alive"));
	headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
	headers
}

/// Entry point: runs the chosen backend under the chosen mode and returns an
/// SSE response framed in the caller's dialect. Under Simulated mode the
/// backend's full `ResponsesResponse` is also returned so the caller can feed
/// the Conversation Store the same way the unary path does; Passthrough mode
/// has no single completed response to hand back, so it yields `None`.
pub async fn stream(
	dialect: Dialect,
	client: &dyn BackendClient,
	req: ResponsesRequest,
	cancel: CancellationToken,
) -> Result<(SseResponse, Option<ResponsesResponse>), GatewayError> {
	let (inner, completed): (ResponseStream, Option<ResponsesResponse>) = match choose_mode(client) {
		Mode::Passthrough => (client.create_response_stream(&req, cancel.clone()).await?, None),
		Mode::Simulated => {
			let resp = client.create_response(&req, cancel.clone()).await?;
			let stream = simulated_stream(resp.clone(), cancel.clone());
			(stream, Some(resp))
		}
	};

	let framed: Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = match dialect {
		Dialect::Claude => Box::pin(claude_frame(inner)),
		Dialect::OpenAi => Box::pin(openai_frame(inner)),
	};

	Ok(((required_headers(), Sse::new(framed).keep_alive(KeepAlive::default())), completed))
}

fn first_text(output: &[ResponseOutput]) -> String {
	output
		.iter()
		.find_map(|o| match o {
			ResponseOutput::Text { text } => Some(text.clone()),
			_ => None,
		})
		.unwrap_or_default()
}

/// Fragments the response's first text output into `SIMULATED_CHUNK_COUNT`
/// pieces (the last carrying the remainder), appending any non-text output
/// (tool calls) and usage/finish data to the final chunk (§4.9).
fn fragment_chunks(resp: &ResponsesResponse) -> Vec<ResponsesStreamChunk> {
	let text = first_text(&resp.output);
	let chars: Vec<char> = text.chars().collect();
	let n = SIMULATED_CHUNK_COUNT;
	let chunk_size = chars.len() / n;

	let mut pieces = Vec::with_capacity(n);
	for i in 0..n - 1 {
		let start = i * chunk_size;
		let end = start + chunk_size;
		pieces.push(chars[start..end].iter().collect::<String>());
	}
	pieces.push(chars[(n - 1) * chunk_size..].iter().collect::<String>());

	let tool_deltas: Vec<StreamOutputDelta> = resp
		.output
		.iter()
		.filter_map(|o| match o {
			ResponseOutput::ToolCall { id, name, arguments } => {
				Some(StreamOutputDelta::ToolCallDelta { id: id.clone(), name: name.clone(), arguments_fragment: arguments.to_string() })
			}
			_ => None,
		})
		.collect();

	let mut chunks = Vec::with_capacity(n);
	for (i, piece) in pieces.into_iter().enumerate() {
		let is_last = i == n - 1;
		let mut output = vec![StreamOutputDelta::TextDelta { text: piece }];
		if is_last {
			output.extend(tool_deltas.clone());
		}
		chunks.push(ResponsesStreamChunk {
			id: resp.id.clone(),
			created: resp.created,
			model: resp.model.clone(),
			output,
			usage: if is_last { Some(resp.usage) } else { None },
			finish_indicator: if is_last { resp.finish_indicator } else { None },
		});
	}
	chunks
}

/// Wraps a fixed chunk list into a `ResponseStream`, sleeping
/// `SIMULATED_CHUNK_DELAY` between chunks (not before the first) and ending
/// the stream immediately on cancellation (§5: "end the SSE iterator at the
/// next yield").
fn simulated_stream(resp: ResponsesResponse, cancel: CancellationToken) -> ResponseStream {
	let chunks: VecDeque<ResponsesStreamChunk> = fragment_chunks(&resp).into();
	let stream = futures::stream::unfold((chunks, cancel, true), |(mut remaining, cancel, first)| async move {
		if cancel.is_cancelled() {
			return None;
		}
		let chunk = remaining.pop_front()?;
		if !first {
			tokio::select! {
				_ = tokio::time::sleep(SIMULATED_CHUNK_DELAY) => {}
				_ = cancel.cancelled() => return None,
			}
		}
		Some((Ok(chunk), (remaining, cancel, false)))
	});
	Box::pin(stream)
}

fn event_json(name: Option<&'static str>, data: serde_json::Value) -> Result<Event, Infallible> {
	let event = Event::default().json_data(data).unwrap_or_else(|_| Event::default());
	Ok(match name {
		Some(n) => event.event(n),
		None => event,
	})
}

/// Claude framing: named SSE events per chunk, `is_first`/`is_last` tracked
/// across the whole stream via `scan` (§4.9).
fn claude_frame(stream: ResponseStream) -> impl Stream<Item = Result<Event, Infallible>> {
	stream
		.scan(false, |started, item| {
			let is_first = !*started;
			*started = true;
			futures::future::ready(Some((is_first, item)))
		})
		.flat_map(|(is_first, item)| match item {
			Ok(chunk) => {
				let is_last = chunk.finish_indicator.is_some();
				let events: Vec<_> = denormalize::claude::denormalize_chunk_events(&chunk, is_first, is_last)
					.into_iter()
					.map(|(name, data)| event_json(Some(name), data))
					.collect();
				futures::stream::iter(events)
			}
			Err(err) => {
				let data = serde_json::json!({"type": "error", "error": {"type": "api_error", "message": err.sanitized_message()}});
				futures::stream::iter(vec![event_json(Some("error"), data)])
			}
		})
}

/// OpenAI framing: unnamed `data:` lines plus a terminating `[DONE]` line
/// after the final chunk (§4.9).
fn openai_frame(stream: ResponseStream) -> impl Stream<Item = Result<Event, Infallible>> {
	stream.flat_map(|item| match item {
		Ok(chunk) => {
			let is_last = chunk.finish_indicator.is_some();
			let data = denormalize::openai::denormalize_chunk(&chunk, is_last);
			let mut events = vec![event_json(None, data)];
			if is_last {
				events.push(Ok(Event::default().data("[DONE]")));
			}
			futures::stream::iter(events)
		}
		Err(err) => {
			let data = serde_json::json!({"error": {"message": err.sanitized_message(), "type": "api_error"}});
			futures::stream::iter(vec![event_json(None, data)])
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::{FinishIndicator, Usage};
	use crate::strng;

	fn resp(text: &str) -> ResponsesResponse {
		ResponsesResponse {
			id: strng::new("resp-1"),
			created: 0,
			model: strng::new("claude-3-5-sonnet-20241022"),
			output: vec![ResponseOutput::Text { text: text.to_string() }],
			usage: Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2, reasoning_tokens: None },
			finish_indicator: Some(FinishIndicator::Stop),
		}
	}

	#[test]
	fn fragments_into_five_chunks_with_remainder_in_last() {
		let chunks = fragment_chunks(&resp("abcdefghijk")); // 11 chars, chunk_size=2
		assert_eq!(chunks.len(), 5);
		for chunk in &chunks[..4] {
			match &chunk.output[0] {
				StreamOutputDelta::TextDelta { text } => assert_eq!(text.chars().count(), 2),
				_ => panic!("expected text delta"),
			}
		}
		match &chunks[4].output[0] {
			StreamOutputDelta::TextDelta { text } => assert_eq!(text, "ijk"),
			_ => panic!("expected text delta"),
		}
	}

	#[test]
	fn only_last_chunk_carries_usage_and_finish_indicator() {
		let chunks = fragment_chunks(&resp("hello world"));
		for chunk in &chunks[..4] {
			assert!(chunk.usage.is_none());
			assert!(chunk.finish_indicator.is_none());
		}
		assert!(chunks[4].usage.is_some());
		assert!(chunks[4].finish_indicator.is_some());
	}

	#[tokio::test]
	async fn simulated_stream_ends_immediately_once_cancelled() {
		let cancel = CancellationToken::new();
		cancel.cancel();
		let mut stream = simulated_stream(resp("hello world"), cancel);
		assert!(stream.next().await.is_none());
	}
}
