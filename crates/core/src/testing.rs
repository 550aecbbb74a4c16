//! Scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use fk_protocol::{Method, RequestDescriptor, ResponseEnvelope};
use fk_runtime::{CancelReason, CancelSignal, Transport, TransportError, TransportFuture};
use parking_lot::Mutex;
use serde_json::Value;

type Outcome = Result<ResponseEnvelope, TransportError>;

/// Answers requests from per-route scripts.
///
/// Each route holds a queue of outcomes; the last one repeats. Unscripted
/// routes answer 404.
#[derive(Default)]
pub(crate) struct MockTransport {
	routes: Mutex<HashMap<String, VecDeque<Outcome>>>,
	calls: Mutex<Vec<RequestDescriptor>>,
	delay: Mutex<Duration>,
}

fn route(method: Method, path: &str) -> String {
	format!("{method} {path}")
}

impl MockTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn respond(&self, method: Method, path: &str, outcome: Outcome) {
		self.routes
			.lock()
			.entry(route(method, path))
			.or_default()
			.push_back(outcome);
	}

	pub fn respond_json(&self, method: Method, path: &str, value: Value) {
		self.respond(method, path, Ok(ResponseEnvelope::ok_json(value)));
	}

	pub fn fail(&self, method: Method, path: &str, err: TransportError) {
		self.respond(method, path, Err(err));
	}

	/// Every call waits this long (on tokio's clock) before answering.
	pub fn set_delay(&self, delay: Duration) {
		*self.delay.lock() = delay;
	}

	pub fn calls(&self) -> Vec<RequestDescriptor> {
		self.calls.lock().clone()
	}

	pub fn calls_to(&self, path: &str) -> usize {
		self.calls.lock().iter().filter(|d| d.path() == path).count()
	}

	fn next_outcome(&self, descriptor: &RequestDescriptor) -> Outcome {
		let mut routes = self.routes.lock();
		match routes.get_mut(&route(descriptor.method(), descriptor.path())) {
			Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
			Some(queue) => queue.front().cloned().unwrap_or_else(not_found),
			None => not_found(),
		}
	}
}

fn not_found() -> Outcome {
	Err(TransportError::http(404, "Not Found", None))
}

impl Transport for MockTransport {
	fn execute(&self, descriptor: RequestDescriptor, cancel: CancelSignal) -> TransportFuture<'_> {
		let outcome = self.next_outcome(&descriptor);
		self.calls.lock().push(descriptor);
		let delay = *self.delay.lock();

		Box::pin(async move {
			if !delay.is_zero() {
				tokio::select! {
					reason = cancel.cancelled() => {
						return Err(match reason {
							CancelReason::Caller => TransportError::cancelled(),
							CancelReason::Timeout => TransportError::timeout(delay),
						});
					}
					_ = tokio::time::sleep(delay) => {}
				}
			}
			outcome
		})
	}
}
