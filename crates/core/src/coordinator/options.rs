//! Per-coordinator options and the published fetch state.

use std::sync::Arc;
use std::time::Duration;

use fk_protocol::Payload;
use fk_runtime::Error;

/// Default base delay between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

pub type SuccessCallback = Arc<dyn Fn(&Payload) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;
pub type SettledCallback = Arc<dyn Fn(Result<&Payload, &Error>) + Send + Sync>;

/// How a [`FetchCoordinator`](super::FetchCoordinator) runs its request.
#[derive(Clone)]
pub struct FetchOptions {
	/// Run when the coordinator is mounted.
	pub immediate: bool,
	/// Only run on an explicit [`run`](super::FetchCoordinator::run).
	pub manual: bool,
	/// Automatic runs are suppressed while false.
	pub enabled: bool,
	/// Require an authenticated session.
	pub auth_required: bool,
	/// Wait for authentication instead of declining.
	pub wait_for_auth: bool,
	/// Retries after the first attempt. A descriptor's own count wins.
	pub retries: u32,
	/// Base of the exponential backoff.
	pub retry_delay: Duration,
	/// Also retry unclassified failures.
	pub retry_system_errors: bool,
	pub cache_key: Option<String>,
	pub cache_ttl: Option<Duration>,
	pub on_success: Option<SuccessCallback>,
	pub on_error: Option<ErrorCallback>,
	pub on_settled: Option<SettledCallback>,
}

impl Default for FetchOptions {
	fn default() -> Self {
		Self {
			immediate: true,
			manual: false,
			enabled: true,
			auth_required: false,
			wait_for_auth: false,
			retries: 0,
			retry_delay: DEFAULT_RETRY_DELAY,
			retry_system_errors: false,
			cache_key: None,
			cache_ttl: None,
			on_success: None,
			on_error: None,
			on_settled: None,
		}
	}
}

impl FetchOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// One-shot options: nothing runs until `run` is called.
	pub fn manual() -> Self {
		Self {
			immediate: false,
			manual: true,
			..Self::default()
		}
	}

	pub fn enabled(mut self, enabled: bool) -> Self {
		self.enabled = enabled;
		self
	}

	pub fn auth_required(mut self) -> Self {
		self.auth_required = true;
		self
	}

	pub fn wait_for_auth(mut self) -> Self {
		self.auth_required = true;
		self.wait_for_auth = true;
		self
	}

	pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
		self.retries = retries;
		self.retry_delay = delay;
		self
	}

	pub fn retry_system_errors(mut self) -> Self {
		self.retry_system_errors = true;
		self
	}

	pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
		self.cache_key = Some(key.into());
		self
	}

	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = Some(ttl);
		self
	}

	pub fn on_success<F>(mut self, f: F) -> Self
	where
		F: Fn(&Payload) + Send + Sync + 'static,
	{
		self.on_success = Some(Arc::new(f));
		self
	}

	pub fn on_error<F>(mut self, f: F) -> Self
	where
		F: Fn(&Error) + Send + Sync + 'static,
	{
		self.on_error = Some(Arc::new(f));
		self
	}

	pub fn on_settled<F>(mut self, f: F) -> Self
	where
		F: Fn(Result<&Payload, &Error>) + Send + Sync + 'static,
	{
		self.on_settled = Some(Arc::new(f));
		self
	}

	/// Delay before retry number `attempt + 1`: `retry_delay × 2^attempt`.
	pub fn backoff(&self, attempt: u32) -> Duration {
		self.retry_delay.saturating_mul(2u32.saturating_pow(attempt))
	}
}

impl std::fmt::Debug for FetchOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FetchOptions")
			.field("immediate", &self.immediate)
			.field("manual", &self.manual)
			.field("enabled", &self.enabled)
			.field("auth_required", &self.auth_required)
			.field("wait_for_auth", &self.wait_for_auth)
			.field("retries", &self.retries)
			.field("retry_delay", &self.retry_delay)
			.field("retry_system_errors", &self.retry_system_errors)
			.field("cache_key", &self.cache_key)
			.field("cache_ttl", &self.cache_ttl)
			.finish_non_exhaustive()
	}
}

/// Snapshot of a coordinator's result.
#[derive(Debug, Clone, Default)]
pub struct FetchState {
	pub data: Option<Payload>,
	pub error: Option<Error>,
	pub loading: bool,
	/// HTTP status of the last network response; `None` for cache hits.
	pub status: Option<u16>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_per_attempt() {
		let options = FetchOptions::new().with_retries(3, Duration::from_millis(100));
		assert_eq!(options.backoff(0), Duration::from_millis(100));
		assert_eq!(options.backoff(1), Duration::from_millis(200));
		assert_eq!(options.backoff(2), Duration::from_millis(400));
		assert_eq!(options.backoff(40), Duration::from_millis(100) * u32::MAX);
	}

	#[test]
	fn manual_options_never_auto_run() {
		let options = FetchOptions::manual();
		assert!(options.manual && !options.immediate && options.enabled);
	}
}
