//! Retry strategy (§4.6): bounded attempts, exponential backoff with jitter,
//! retries only on classified-retryable kinds.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub timeout: Duration,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(10),
			timeout: Duration::from_millis(120_000),
		}
	}
}

/// `delay = min(maxDelay, baseDelay * 2^(attempt-1)) * (1 + jitter)`,
/// `jitter ∈ [0, 0.25)` uniform (§4.6). `attempt` is 1-based.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
	let exp = config.base_delay.saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
	let capped = exp.min(config.max_delay);
	let jitter: f64 = rand::rng().random_range(0.0..0.25);
	capped.mul_f64(1.0 + jitter)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryOutcome {
	pub attempts: u32,
}

/// Runs `op` up to `maxAttempts` times. Retries only on retryable kinds
/// (`Timeout, Network, Upstream5xx, RateLimit`); a `RateLimit` error honors a
/// server-provided `retry_after` hint in place of the computed backoff.
/// Returns on the first success, or the last error on exhaustion. Canceling
/// `cancel` during a backoff sleep terminates immediately with `Canceled`
/// (§4.6, §5, §8 property 7).
pub async fn retry<F, Fut, T>(
	config: &RetryConfig,
	cancel: &CancellationToken,
	mut op: F,
) -> (Result<T, GatewayError>, RetryOutcome)
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, GatewayError>>,
{
	let deadline = tokio::time::Instant::now() + config.timeout;
	let mut attempts: u32 = 0;
	loop {
		attempts += 1;
		if cancel.is_cancelled() {
			return (Err(GatewayError::Canceled), RetryOutcome { attempts });
		}

		let call = op(attempts);
		let result = tokio::select! {
			r = call => r,
			_ = cancel.cancelled() => Err(GatewayError::Canceled),
			_ = tokio::time::sleep_until(deadline) => Err(GatewayError::Timeout),
		};

		match result {
			Ok(value) => return (Ok(value), RetryOutcome { attempts }),
			Err(err) => {
				if matches!(err, GatewayError::Canceled) {
					return (Err(err), RetryOutcome { attempts });
				}
				let exhausted = attempts >= config.max_attempts;
				if exhausted || !err.retryable() {
					return (Err(err), RetryOutcome { attempts });
				}
				let delay = err.retry_after().unwrap_or_else(|| backoff_delay(config, attempts));
				tokio::select! {
					_ = tokio::time::sleep(delay) => {}
					_ = cancel.cancelled() => return (Err(GatewayError::Canceled), RetryOutcome { attempts }),
				}
			}
		}
	}
}
