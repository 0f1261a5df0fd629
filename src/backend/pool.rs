//! Per-client active-resource tracking and shared HTTP connection pool
//! construction (§4.7, §5). One pool per backend client, thread-safe, one of
//! the three process-wide singletons admitted by §9.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::ConnectionResource;
use crate::strng::Strng;

/// Builds a `reqwest::Client` with idle sockets reclaimed after ~30s and a
/// fixed user-agent, replacing the teacher's mesh `hyper_util_fork` client
/// (out of scope per spec.md's "no cluster-wide coordination" Non-goal;
/// see DESIGN.md).
pub fn build_http_client(user_agent: &str, request_timeout: Duration) -> Result<reqwest::Client, crate::error::GatewayError> {
	reqwest::Client::builder()
		.user_agent(user_agent.to_string())
		.pool_idle_timeout(Duration::from_secs(30))
		.timeout(request_timeout)
		.build()
		.map_err(crate::error::GatewayError::from)
}

/// The active-set a `BackendClient` tracks its in-flight `ConnectionResource`s
/// in. On shutdown, all active resources are awaited with a bounded grace
/// period, after which forced close occurs (§4.7).
#[derive(Default)]
pub struct ResourceTracker {
	active: Mutex<HashMap<Strng, Arc<ConnectionResource>>>,
}

impl ResourceTracker {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn track(&self, resource: Arc<ConnectionResource>) {
		self.active.lock().insert(resource.id().clone(), resource);
	}

	pub fn release(&self, id: &Strng) {
		if let Some(resource) = self.active.lock().remove(id) {
			resource.dispose();
		}
	}

	pub fn active_count(&self) -> usize {
		self.active.lock().len()
	}

	/// Waits up to `grace` for active resources to drain; anything left after
	/// the deadline is force-disposed.
	pub async fn shutdown(&self, grace: Duration) {
		let deadline = tokio::time::Instant::now() + grace;
		while self.active_count() > 0 && tokio::time::Instant::now() < deadline {
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		let mut active = self.active.lock();
		for (_, resource) in active.drain() {
			resource.dispose();
		}
	}
}

/// Releases a tracked resource when dropped — lets a `'static` stream that
/// has moved off the originating stack frame still release its resource
/// when the stream is exhausted or dropped on cancellation (§4.9, §9: a
/// stream iterator exclusively owns its `ConnectionResource`).
pub struct ReleaseGuard {
	tracker: Arc<ResourceTracker>,
	id: Strng,
}

impl ReleaseGuard {
	pub fn new(tracker: Arc<ResourceTracker>, id: Strng) -> Self {
		Self { tracker, id }
	}
}

impl Drop for ReleaseGuard {
	fn drop(&mut self) {
		self.tracker.release(&self.id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::strng;

	#[tokio::test]
	async fn shutdown_force_disposes_after_grace_period() {
		let tracker = ResourceTracker::new();
		tracker.track(Arc::new(ConnectionResource::new(strng::new("r1"))));
		assert_eq!(tracker.active_count(), 1);
		tracker.shutdown(Duration::from_millis(10)).await;
		assert_eq!(tracker.active_count(), 0);
	}

	#[test]
	fn release_disposes_tracked_resource() {
		let tracker = ResourceTracker::new();
		let resource = Arc::new(ConnectionResource::new(strng::new("r1")));
		tracker.track(resource.clone());
		tracker.release(&strng::new("r1"));
		assert!(resource.is_disposed());
	}
}
