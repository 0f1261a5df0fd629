//! Resilience Layer (§4.6): circuit breaker + retry composed as "breaker
//! wraps retry wraps the backend call". An inner `CircuitOpen` propagates out
//! without further attempts; there is none in this composition because the
//! breaker check happens exactly once, before any retry attempt.

pub mod breaker;
pub mod retry;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::strng::Strng;
use breaker::{BreakerRegistry, StateTag};
use retry::{RetryConfig, RetryOutcome};

pub struct ResilienceLayer {
	pub registry: BreakerRegistry,
	pub retry_config: RetryConfig,
}

/// What `ResilienceLayer::call` observed about one call, for the caller to
/// feed into `Metrics` (§9: "metrics counters: atomic updates" live at the
/// call site, not inside the layer itself).
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOutcome {
	pub retry: RetryOutcome,
	pub circuit_tripped: bool,
}

impl ResilienceLayer {
	pub fn new(breaker_config: breaker::BreakerConfig, retry_config: RetryConfig) -> Self {
		Self { registry: BreakerRegistry::new(breaker_config), retry_config }
	}

	/// Runs `op` under the breaker for `(provider, operation)`, retrying per
	/// `retry_config` on retryable kinds. Reports the terminal outcome back
	/// to the breaker exactly once.
	pub async fn call<F, Fut, T>(
		&self,
		provider: &Strng,
		operation: &Strng,
		cancel: &CancellationToken,
		op: F,
	) -> (Result<T, GatewayError>, CallOutcome)
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T, GatewayError>>,
	{
		let circuit = self.registry.get_or_create(provider, operation);
		if let Err(err) = circuit.allow(provider, operation) {
			return (Err(err), CallOutcome::default());
		}

		let (result, retry) = retry::retry(&self.retry_config, cancel, op).await;
		let circuit_tripped = match &result {
			Ok(_) => {
				circuit.on_success();
				false
			}
			Err(err) => {
				let before = circuit.state_tag();
				circuit.on_failure(err.kind());
				before != StateTag::Open && circuit.state_tag() == StateTag::Open
			}
		};
		(result, CallOutcome { retry, circuit_tripped })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::strng;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;
	use std::time::Duration;

	#[tokio::test]
	async fn circuit_open_short_circuits_without_invoking_backend() {
		let layer = ResilienceLayer::new(
			breaker::BreakerConfig { failure_threshold: 1, recovery_timeout: Duration::from_secs(60) },
			RetryConfig { max_attempts: 1, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(1), timeout: Duration::from_secs(5) },
		);
		let provider = strng::new("bedrock");
		let op = strng::new("createResponse");
		let cancel = CancellationToken::new();

		let calls = Arc::new(AtomicU32::new(0));
		let c2 = calls.clone();
		let (_, outcome) = layer
			.call(&provider, &op, &cancel, move |_| {
				let c = c2.clone();
				async move {
					c.fetch_add(1, Ordering::SeqCst);
					Err::<(), _>(GatewayError::Network(strng::new("boom")))
				}
			})
			.await;
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(outcome.circuit_tripped);

		let c3 = calls.clone();
		let (result, outcome) = layer
			.call(&provider, &op, &cancel, move |_| {
				let c = c3.clone();
				async move {
					c.fetch_add(1, Ordering::SeqCst);
					Ok::<_, GatewayError>(())
				}
			})
			.await;
		assert!(matches!(result, Err(GatewayError::CircuitOpen { .. })));
		assert!(!outcome.circuit_tripped);
		// the backend was never invoked for the short-circuited call
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
