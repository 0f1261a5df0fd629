//! Process-wide counters (§9: "metrics counters: atomic updates"). Dedicated
//! metrics/health HTTP endpoints are out of scope (spec.md §1 Non-goals); this
//! module only feeds the counters something else could expose later.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
	requests_total: AtomicU64,
	requests_errored: AtomicU64,
	retries_total: AtomicU64,
	circuit_trips_total: AtomicU64,
	stream_sessions_total: AtomicU64,
	degraded_responses_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
	pub requests_total: u64,
	pub requests_errored: u64,
	pub retries_total: u64,
	pub circuit_trips_total: u64,
	pub stream_sessions_total: u64,
	pub degraded_responses_total: u64,
}

impl Metrics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_request(&self) {
		self.requests_total.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_error(&self) {
		self.requests_errored.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_retry(&self) {
		self.retries_total.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_circuit_trip(&self) {
		self.circuit_trips_total.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_stream_session(&self) {
		self.stream_sessions_total.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_degraded_response(&self) {
		self.degraded_responses_total.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			requests_total: self.requests_total.load(Ordering::Relaxed),
			requests_errored: self.requests_errored.load(Ordering::Relaxed),
			retries_total: self.retries_total.load(Ordering::Relaxed),
			circuit_trips_total: self.circuit_trips_total.load(Ordering::Relaxed),
			stream_sessions_total: self.stream_sessions_total.load(Ordering::Relaxed),
			degraded_responses_total: self.degraded_responses_total.load(Ordering::Relaxed),
		}
	}
}
