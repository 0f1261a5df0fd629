//! Conversation Store (§4.4): an in-memory, bounded, TTL- and LRU-evicted
//! table keyed by conversation id. Guarded by a single lock (§5: "a single
//! mutex or per-key lock sharded on the id suffices"), following the
//! teacher's preference for `parking_lot` over `std::sync::Mutex`
//! (`store/binds.rs`, `llm/mod.rs`).

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::strng::{self, Strng};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_STORED_CONVERSATIONS: usize = 1000;

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsDelta {
	pub tokens: u64,
	pub reasoning_tokens: u64,
	pub response_time_ms: u64,
	pub is_error: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
	pub message_count: u64,
	pub total_tokens: u64,
	pub reasoning_tokens: u64,
	pub avg_response_time_ms: f64,
	pub error_count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
	/// A derived score; higher means the conversation has trended toward
	/// larger, more error-prone, or slower turns (feeds the Analyzer).
	pub task_complexity: f64,
}

#[derive(Debug, Clone)]
pub struct ConversationEntry {
	pub id: Strng,
	pub created_at: Instant,
	pub last_updated_at: Instant,
	pub previous_response_id: Option<Strng>,
	pub metrics: Metrics,
	pub context: Context,
}

impl ConversationEntry {
	fn new(id: Strng, now: Instant) -> Self {
		Self {
			id,
			created_at: now,
			last_updated_at: now,
			previous_response_id: None,
			metrics: Metrics::default(),
			context: Context::default(),
		}
	}

	fn apply(&mut self, response_id: Option<Strng>, delta: MetricsDelta, now: Instant) {
		let m = &mut self.metrics;
		let prior_count = m.message_count;
		m.message_count += 1;
		m.total_tokens += delta.tokens;
		m.reasoning_tokens += delta.reasoning_tokens;
		// Running mean over response time, folding the new sample in.
		m.avg_response_time_ms =
			(m.avg_response_time_ms * prior_count as f64 + delta.response_time_ms as f64) / m.message_count as f64;
		if delta.is_error {
			m.error_count += 1;
		}
		if let Some(rid) = response_id {
			self.previous_response_id = Some(rid);
		}
		let error_rate = if m.message_count > 0 { m.error_count as f64 / m.message_count as f64 } else { 0.0 };
		self.context.task_complexity = (m.avg_response_time_ms / 1000.0) + error_rate * 10.0;
		self.last_updated_at = now;
	}
}

struct Inner {
	entries: IndexMap<Strng, ConversationEntry>,
	max_age: Duration,
	max_size: usize,
}

/// The process-wide Conversation Store singleton (§9: admitted global state,
/// requires an explicit init/shutdown pair).
pub struct ConversationStore {
	inner: Mutex<Inner>,
}

impl ConversationStore {
	pub fn new(max_age: Duration, max_size: usize) -> Self {
		Self { inner: Mutex::new(Inner { entries: IndexMap::new(), max_age, max_size }) }
	}

	pub fn with_defaults() -> Self {
		Self::new(DEFAULT_MAX_AGE, DEFAULT_MAX_STORED_CONVERSATIONS)
	}

	/// Increments `messageCount`, accumulates tokens, folds response time into
	/// a running mean, and sets `previousResponseId` (§4.4).
	pub fn track(&self, conversation_id: &Strng, response_id: Strng, delta: MetricsDelta) {
		let now = Instant::now();
		let mut inner = self.inner.lock();
		inner
			.entries
			.entry(conversation_id.clone())
			.or_insert_with(|| ConversationEntry::new(conversation_id.clone(), now))
			.apply(Some(response_id), delta, now);
		Self::evict_over_capacity(&mut inner);
	}

	/// Records an outcome (typically an error) without necessarily advancing
	/// `previousResponseId` (§4.4 `updateMetrics`).
	pub fn update_metrics(&self, conversation_id: &Strng, delta: MetricsDelta) {
		let now = Instant::now();
		let mut inner = self.inner.lock();
		inner
			.entries
			.entry(conversation_id.clone())
			.or_insert_with(|| ConversationEntry::new(conversation_id.clone(), now))
			.apply(None, delta, now);
		Self::evict_over_capacity(&mut inner);
	}

	pub fn get_previous_response_id(&self, conversation_id: &Strng) -> Option<Strng> {
		self.inner.lock().entries.get(conversation_id).and_then(|e| e.previous_response_id.clone())
	}

	pub fn get_context(&self, conversation_id: &Strng) -> Option<Context> {
		self.inner.lock().entries.get(conversation_id).map(|e| e.context)
	}

	pub fn get_metrics(&self, conversation_id: &Strng) -> Option<Metrics> {
		self.inner.lock().entries.get(conversation_id).map(|e| e.metrics)
	}

	pub fn get_entry(&self, conversation_id: &Strng) -> Option<ConversationEntry> {
		self.inner.lock().entries.get(conversation_id).cloned()
	}

	pub fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Removes entries whose `lastUpdatedAt` is older than `maxAge` (§4.4).
	pub fn cleanup(&self) {
		let now = Instant::now();
		let mut inner = self.inner.lock();
		let max_age = inner.max_age;
		inner.entries.retain(|_, e| now.duration_since(e.last_updated_at) <= max_age);
	}

	/// On each insert, if size exceeds the cap, evicts the oldest-by-
	/// `lastUpdatedAt` entries until size equals the cap (§4.4 eviction policy).
	fn evict_over_capacity(inner: &mut Inner) {
		while inner.entries.len() > inner.max_size {
			let oldest_key = inner
				.entries
				.iter()
				.min_by_key(|(_, e)| e.last_updated_at)
				.map(|(k, _)| k.clone());
			let Some(key) = oldest_key else { break };
			inner.entries.shift_remove(&key);
		}
	}

	/// Tries, in order, `x-conversation-id`, `conversation-id`, `x-session-id`,
	/// `session-id`, `x-thread-id`, `thread-id`; the first non-empty header
	/// wins. Falls back to `conv-<correlationId>` (§4.4).
	pub fn extract_conversation_id(headers: &http::HeaderMap, fallback_correlation_id: &str) -> Strng {
		const CANDIDATE_HEADERS: &[&str] =
			&["x-conversation-id", "conversation-id", "x-session-id", "session-id", "x-thread-id", "thread-id"];
		for name in CANDIDATE_HEADERS {
			if let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) {
				if !value.trim().is_empty() {
					return strng::new(value);
				}
			}
		}
		strng::format!("conv-{}", fallback_correlation_id)
	}

	/// Spawns the background cleanup tick (§4.4, §9: explicit init, no hidden
	/// lazy initialization). Returns a handle whose cancellation on shutdown
	/// stops the task.
	pub fn spawn_cleanup_task(
		self: std::sync::Arc<Self>,
		interval: Duration,
		shutdown: tokio_util::sync::CancellationToken,
	) -> tokio::task::JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			loop {
				tokio::select! {
					_ = ticker.tick() => self.cleanup(),
					_ = shutdown.cancelled() => break,
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn continuity_tracks_latest_response_id_and_message_count() {
		let store = ConversationStore::with_defaults();
		let c = strng::new("c1");
		store.track(&c, strng::new("r1"), MetricsDelta::default());
		store.track(&c, strng::new("r2"), MetricsDelta::default());
		assert_eq!(store.get_previous_response_id(&c), Some(strng::new("r2")));
		assert_eq!(store.get_metrics(&c).unwrap().message_count, 2);
	}

	#[test]
	fn eviction_bound_keeps_cap_and_survivors_are_most_recent() {
		let store = ConversationStore::new(DEFAULT_MAX_AGE, 3);
		for i in 0..5 {
			let id = strng::format!("c{i}");
			store.track(&id, strng::format!("r{i}"), MetricsDelta::default());
		}
		assert_eq!(store.len(), 3);
		for i in 2..5 {
			assert!(store.get_entry(&strng::format!("c{i}")).is_some());
		}
		for i in 0..2 {
			assert!(store.get_entry(&strng::format!("c{i}")).is_none());
		}
	}

	#[test]
	fn extract_conversation_id_prefers_first_matching_header() {
		let mut headers = http::HeaderMap::new();
		headers.insert("x-session-id", "sess-1".parse().unwrap());
		headers.insert("thread-id", "thread-1".parse().unwrap());
		assert_eq!(ConversationStore::extract_conversation_id(&headers, "fallback"), strng::new("sess-1"));

		let empty = http::HeaderMap::new();
		assert_eq!(ConversationStore::extract_conversation_id(&empty, "abc"), strng::new("conv-abc"));
	}

	#[test]
	fn error_count_never_exceeds_message_count() {
		let store = ConversationStore::with_defaults();
		let c = strng::new("c1");
		store.track(&c, strng::new("r1"), MetricsDelta { is_error: true, ..Default::default() });
		let m = store.get_metrics(&c).unwrap();
		assert!(m.error_count <= m.message_count);
	}
}
