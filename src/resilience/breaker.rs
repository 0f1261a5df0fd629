//! Circuit breaker (§4.6, §3 `CircuitState`). One instance per
//! `(provider, operation)` key, living for the process lifetime.
//!
//! Grounded in `other_examples/a7d2ea0a_castingclouds-circuit-breaker` and
//! `other_examples/df899831_omnidotdev-synapse-gateway`'s
//! `ProviderHealthTracker` — this shape is absent from the chosen teacher's
//! retrieved files.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{FailureKind, GatewayError};
use crate::strng::Strng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTag {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
	pub failure_threshold: u32,
	pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
	fn default() -> Self {
		Self { failure_threshold: 5, recovery_timeout: Duration::from_secs(60) }
	}
}

struct State {
	tag: StateTag,
	failure_count: u32,
	opened_at: Option<Instant>,
	next_attempt_at: Option<Instant>,
}

impl State {
	fn closed() -> Self {
		Self { tag: StateTag::Closed, failure_count: 0, opened_at: None, next_attempt_at: None }
	}
}

/// A single provider+operation breaker.
pub struct Breaker {
	state: Mutex<State>,
	config: BreakerConfig,
}

impl Breaker {
	pub fn new(config: BreakerConfig) -> Self {
		Self { state: Mutex::new(State::closed()), config }
	}

	/// Checks whether a call may proceed. While `Open`, short-circuits with
	/// `CircuitOpen` — no invocation, no retry. `Open -> HalfOpen` transitions
	/// here once `recoveryTimeout` has elapsed, admitting exactly one probe.
	pub fn allow(&self, provider: &Strng, operation: &Strng) -> Result<(), GatewayError> {
		let now = Instant::now();
		let mut s = self.state.lock();
		match s.tag {
			StateTag::Closed => Ok(()),
			StateTag::HalfOpen => Ok(()),
			StateTag::Open => {
				if s.next_attempt_at.map(|t| now >= t).unwrap_or(false) {
					s.tag = StateTag::HalfOpen;
					Ok(())
				} else {
					Err(GatewayError::CircuitOpen { provider: provider.clone(), operation: operation.clone() })
				}
			}
		}
	}

	/// `HalfOpen -> Closed` after one successful probe; resets the failure count.
	pub fn on_success(&self) {
		let mut s = self.state.lock();
		s.tag = StateTag::Closed;
		s.failure_count = 0;
		s.opened_at = None;
		s.next_attempt_at = None;
	}

	/// Counts only *expected* error kinds (§4.6: client errors must not trip
	/// it). `Closed -> Open` after `failureThreshold` consecutive qualifying
	/// failures; `HalfOpen -> Open` on any probe failure.
	pub fn on_failure(&self, kind: FailureKind) {
		if !kind.trips_breaker() {
			return;
		}
		let now = Instant::now();
		let mut s = self.state.lock();
		match s.tag {
			StateTag::HalfOpen => {
				s.tag = StateTag::Open;
				s.failure_count = self.config.failure_threshold;
				s.opened_at = Some(now);
				s.next_attempt_at = Some(now + self.config.recovery_timeout);
			}
			StateTag::Closed | StateTag::Open => {
				s.failure_count += 1;
				if s.failure_count >= self.config.failure_threshold {
					s.tag = StateTag::Open;
					s.opened_at = Some(now);
					s.next_attempt_at = Some(now + self.config.recovery_timeout);
				}
			}
		}
	}

	pub fn state_tag(&self) -> StateTag {
		self.state.lock().tag
	}
}

/// Registry keyed by `(provider, operation)`, read-mostly; entry creation is
/// double-checked (§5). One of the three process-wide singletons admitted by
/// §9.
pub struct BreakerRegistry {
	breakers: Mutex<HashMap<(Strng, Strng), std::sync::Arc<Breaker>>>,
	config: BreakerConfig,
}

impl BreakerRegistry {
	pub fn new(config: BreakerConfig) -> Self {
		Self { breakers: Mutex::new(HashMap::new()), config }
	}

	pub fn get_or_create(&self, provider: &Strng, operation: &Strng) -> std::sync::Arc<Breaker> {
		let key = (provider.clone(), operation.clone());
		let mut map = self.breakers.lock();
		map.entry(key).or_insert_with(|| std::sync::Arc::new(Breaker::new(self.config))).clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::strng;

	#[test]
	fn opens_after_threshold_consecutive_failures() {
		let b = Breaker::new(BreakerConfig { failure_threshold: 3, recovery_timeout: Duration::from_secs(60) });
		let p = strng::new("bedrock");
		let op = strng::new("createResponse");
		for _ in 0..2 {
			assert!(b.allow(&p, &op).is_ok());
			b.on_failure(FailureKind::Network);
		}
		// third failure trips it
		assert!(b.allow(&p, &op).is_ok());
		b.on_failure(FailureKind::Network);
		assert_eq!(b.state_tag(), StateTag::Open);
		// the (n+1)-th call short-circuits
		assert!(matches!(b.allow(&p, &op), Err(GatewayError::CircuitOpen { .. })));
	}

	#[test]
	fn client_errors_do_not_trip_breaker() {
		let b = Breaker::new(BreakerConfig { failure_threshold: 1, recovery_timeout: Duration::from_secs(60) });
		b.on_failure(FailureKind::Validation);
		assert_eq!(b.state_tag(), StateTag::Closed);
	}

	#[test]
	fn half_open_probe_failure_reopens() {
		let b = Breaker::new(BreakerConfig { failure_threshold: 1, recovery_timeout: Duration::from_millis(0) });
		let p = strng::new("azure");
		let op = strng::new("createResponse");
		b.on_failure(FailureKind::Timeout);
		assert_eq!(b.state_tag(), StateTag::Open);
		// recovery_timeout is 0 so the next `allow` transitions to half-open
		assert!(b.allow(&p, &op).is_ok());
		assert_eq!(b.state_tag(), StateTag::HalfOpen);
		b.on_failure(FailureKind::Timeout);
		assert_eq!(b.state_tag(), StateTag::Open);
	}

	#[test]
	fn half_open_success_closes() {
		let b = Breaker::new(BreakerConfig { failure_threshold: 1, recovery_timeout: Duration::from_millis(0) });
		let p = strng::new("azure");
		let op = strng::new("createResponse");
		b.on_failure(FailureKind::Timeout);
		b.allow(&p, &op).unwrap();
		b.on_success();
		assert_eq!(b.state_tag(), StateTag::Closed);
	}
}
