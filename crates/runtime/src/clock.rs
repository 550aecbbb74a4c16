//! Wall-clock access for expiry arithmetic.
//!
//! Token expiries and cache timestamps are absolute epoch milliseconds, but
//! timers run on tokio's clock. [`SystemClock`] anchors the wall time once and
//! advances it with [`tokio::time::Instant`], so a paused test runtime moves
//! both together.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time in Unix epoch milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
	fn now_ms(&self) -> i64;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock that follows tokio's (possibly paused) timer.
#[derive(Debug, Clone)]
pub struct SystemClock {
	anchor_wall_ms: i64,
	anchor: tokio::time::Instant,
}

impl SystemClock {
	pub fn new() -> Self {
		let anchor_wall_ms = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_millis() as i64;
		Self {
			anchor_wall_ms,
			anchor: tokio::time::Instant::now(),
		}
	}

	pub fn shared() -> SharedClock {
		Arc::new(Self::new())
	}
}

impl Default for SystemClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for SystemClock {
	fn now_ms(&self) -> i64 {
		self.anchor_wall_ms + self.anchor.elapsed().as_millis() as i64
	}
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
	now: AtomicI64,
}

impl ManualClock {
	pub fn new(start_ms: i64) -> Self {
		Self {
			now: AtomicI64::new(start_ms),
		}
	}

	pub fn set(&self, now_ms: i64) {
		self.now.store(now_ms, Ordering::SeqCst);
	}

	pub fn advance(&self, by: Duration) {
		self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> i64 {
		self.now.load(Ordering::SeqCst)
	}
}
