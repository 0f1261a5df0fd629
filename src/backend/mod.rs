//! The neutral, backend-facing shape (§3 `ResponsesRequest` / `ResponsesResponse`
//! / `ResponsesStreamChunk`) and the `BackendClient` trait every provider
//! implements (§4.7).

pub mod azure;
pub mod bedrock;
pub mod pool;
pub mod sse_reader;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::strng::Strng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
	Minimal,
	Low,
	Medium,
	High,
}

impl ReasoningEffort {
	/// `max(a, b)` in the `minimal < low < medium < high` order (§4.2, §9: the
	/// analyzer may raise effort, it never lowers a caller-provided hint).
	pub fn floor_raised_by(self, analyzed: ReasoningEffort) -> ReasoningEffort {
		self.max(analyzed)
	}
}

impl Default for ReasoningEffort {
	fn default() -> Self {
		ReasoningEffort::Medium
	}
}

#[derive(Debug, Clone)]
pub enum ResponsesInput {
	Text(String),
	Messages(Vec<NeutralMessage>),
}

#[derive(Debug, Clone)]
pub struct NeutralMessage {
	pub role: Strng,
	pub content: String,
}

#[derive(Debug, Clone)]
pub struct NeutralTool {
	pub name: Strng,
	pub description: Option<String>,
	pub parameters: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum NeutralToolChoice {
	Auto,
	Tool { name: Strng },
}

/// §3 `ResponsesRequest`: the neutral backend-facing shape every dialect
/// normalizes into and every `BackendClient` consumes.
#[derive(Debug, Clone)]
pub struct ResponsesRequest {
	pub model: Strng,
	pub input: ResponsesInput,
	pub reasoning_effort: ReasoningEffort,
	pub max_output_tokens: Option<u32>,
	pub temperature: Option<f32>,
	pub top_p: Option<f32>,
	pub stream: bool,
	pub previous_response_id: Option<Strng>,
	pub tools: Vec<NeutralTool>,
	pub tool_choice: Option<NeutralToolChoice>,
	pub stop: Vec<String>,
	pub response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningStatus {
	InProgress,
	Completed,
}

/// A hint from the backend about why generation stopped, when it provides one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishIndicator {
	Stop,
	Length,
	ToolUse,
}

#[derive(Debug, Clone)]
pub enum ResponseOutput {
	Text { text: String },
	Reasoning { content: String, status: ReasoningStatus },
	ToolCall { id: String, name: String, arguments: serde_json::Value },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
	pub prompt_tokens: u64,
	pub completion_tokens: u64,
	pub total_tokens: u64,
	pub reasoning_tokens: Option<u64>,
}

impl Usage {
	/// `usage.total_tokens >= prompt + completion` unless the backend omitted
	/// totals, in which case derive it (§3 invariant).
	pub fn normalized(mut self) -> Self {
		let floor = self.prompt_tokens + self.completion_tokens;
		if self.total_tokens < floor {
			self.total_tokens = floor;
		}
		self
	}
}

/// §3 `ResponsesResponse`.
#[derive(Debug, Clone)]
pub struct ResponsesResponse {
	pub id: Strng,
	pub created: i64,
	pub model: Strng,
	pub output: Vec<ResponseOutput>,
	pub usage: Usage,
	pub finish_indicator: Option<FinishIndicator>,
}

#[derive(Debug, Clone)]
pub enum StreamOutputDelta {
	TextDelta { text: String },
	ReasoningDelta { text: String, status: ReasoningStatus },
	ToolCallDelta { id: String, name: String, arguments_fragment: String },
}

/// §3 `ResponsesStreamChunk`. The final chunk (and only the final chunk)
/// carries `usage`.
#[derive(Debug, Clone)]
pub struct ResponsesStreamChunk {
	pub id: Strng,
	pub created: i64,
	pub model: Strng,
	pub output: Vec<StreamOutputDelta>,
	pub usage: Option<Usage>,
	pub finish_indicator: Option<FinishIndicator>,
}

/// §3 `ConnectionResource`: tracks an in-flight upstream call or SSE stream.
/// Disposed exactly once; created at request start, released on success,
/// error, or cancellation.
pub struct ConnectionResource {
	id: Strng,
	created_at: std::time::Instant,
	disposed: std::sync::atomic::AtomicBool,
}

impl ConnectionResource {
	pub fn new(id: Strng) -> Self {
		Self { id, created_at: std::time::Instant::now(), disposed: std::sync::atomic::AtomicBool::new(false) }
	}

	pub fn id(&self) -> &Strng {
		&self.id
	}

	pub fn age(&self) -> Duration {
		self.created_at.elapsed()
	}

	/// Disposes the resource, returning whether this call was the one that
	/// actually performed disposal (idempotent — disposal happens exactly once).
	pub fn dispose(&self) -> bool {
		self.disposed.swap(true, std::sync::atomic::Ordering::AcqRel) == false
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(std::sync::atomic::Ordering::Acquire)
	}
}

impl Drop for ConnectionResource {
	fn drop(&mut self) {
		self.dispose();
	}
}

pub type StreamItem = Result<ResponsesStreamChunk, GatewayError>;
pub type ResponseStream = std::pin::Pin<Box<dyn futures::Stream<Item = StreamItem> + Send>>;

/// One client per provider (§4.7). Implementations validate their
/// configuration at construction (HTTPS base URL, non-empty api key,
/// deployment, positive timeout, non-negative max retries).
#[async_trait]
pub trait BackendClient: Send + Sync {
	fn name(&self) -> Strng;

	async fn create_response(
		&self,
		req: &ResponsesRequest,
		cancel: CancellationToken,
	) -> Result<ResponsesResponse, GatewayError>;

	async fn create_response_stream(
		&self,
		req: &ResponsesRequest,
		cancel: CancellationToken,
	) -> Result<ResponseStream, GatewayError>;

	/// Whether this client's `create_response_stream` is a true passthrough
	/// stream rather than an error stub. The Streaming Engine simulates over
	/// both backends regardless of this flag under current policy (§4.9); it
	/// exists so that policy can later switch to passthrough per backend
	/// without changing the client.
	fn supports_native_streaming(&self) -> bool {
		false
	}
}
