//! Fetch coordinator.
//!
//! A [`FetchCoordinator`] binds one [`RequestDescriptor`] to its
//! [`FetchOptions`] and drives it through the shared pieces of a client:
//!
//! 1. **Auth gate**: an auth-required request waits for, or declines
//!    without, an authenticated session.
//! 2. **Cache**: read-only requests with a cache key are answered from the
//!    [`ResultCache`] while the entry lives.
//! 3. **Dedup**: identical in-flight requests share one transport call
//!    through the [`PendingRegistry`].
//! 4. **Retry**: transient failures are retried with exponential backoff.
//!
//! Each run owns a [`CancelHandle`]. Starting a new run cancels the previous
//! one, and a cancelled or superseded run never touches the cache or the
//! published [`FetchState`].

mod options;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fk_protocol::{CachePolicy, Payload, RequestDescriptor, ResponseEnvelope};
use fk_runtime::{
	CancelHandle, CancelSignal, Error, ErrorKind, PendingRegistry, ResultCache, Result, SharedTransport,
};
use futures_util::FutureExt;
pub use options::{DEFAULT_RETRY_DELAY, ErrorCallback, FetchOptions, FetchState, SettledCallback, SuccessCallback};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::session::SessionManager;

/// Successful outcome of one run before it is published.
struct Fetched {
	data: Payload,
	status: Option<u16>,
	from_cache: bool,
}

/// In-flight run.
struct ActiveRun {
	generation: u64,
	cancel: CancelHandle,
}

/// Runs one request with caching, dedup, retries and an auth gate.
pub struct FetchCoordinator {
	transport: SharedTransport,
	session: Arc<SessionManager>,
	cache: Arc<ResultCache>,
	pending: Arc<PendingRegistry>,
	descriptor: RequestDescriptor,
	options: FetchOptions,
	enabled: AtomicBool,
	generation: AtomicU64,
	active: Mutex<Option<ActiveRun>>,
	state_tx: watch::Sender<FetchState>,
}

impl FetchCoordinator {
	pub fn new(
		transport: SharedTransport,
		session: Arc<SessionManager>,
		cache: Arc<ResultCache>,
		pending: Arc<PendingRegistry>,
		descriptor: RequestDescriptor,
		options: FetchOptions,
	) -> Arc<Self> {
		let descriptor = if options.auth_required {
			descriptor.with_auth_required(true)
		} else {
			descriptor
		};
		let (state_tx, _) = watch::channel(FetchState::default());

		Arc::new(Self {
			transport,
			session,
			cache,
			pending,
			enabled: AtomicBool::new(options.enabled),
			descriptor,
			options,
			generation: AtomicU64::new(0),
			active: Mutex::new(None),
			state_tx,
		})
	}

	pub fn descriptor(&self) -> &RequestDescriptor {
		&self.descriptor
	}

	pub fn options(&self) -> &FetchOptions {
		&self.options
	}

	pub fn state(&self) -> FetchState {
		self.state_tx.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<FetchState> {
		self.state_tx.subscribe()
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::SeqCst)
	}

	/// Key results are cached under, if this request is cacheable.
	///
	/// Only read-only methods cache. An explicit key always applies unless
	/// the descriptor forbids storing; otherwise [`CachePolicy::Cache`] keys
	/// by request signature.
	pub fn cache_key(&self) -> Option<String> {
		if !self.descriptor.method().is_read_only() {
			return None;
		}
		match (self.descriptor.cache_policy(), &self.options.cache_key) {
			(CachePolicy::NoStore, _) => None,
			(_, Some(key)) => Some(key.clone()),
			(CachePolicy::Cache, None) => Some(self.descriptor.signature().to_string()),
			(CachePolicy::Default, None) => None,
		}
	}

	/// Starts the automatic run if the options ask for one.
	pub fn mount(self: &Arc<Self>) -> Option<JoinHandle<Result<Payload>>> {
		if !self.options.immediate || self.options.manual || !self.is_enabled() {
			return None;
		}
		Some(self.spawn_run())
	}

	/// Enables or disables automatic runs. Re-enabling a non-manual
	/// coordinator starts a run.
	pub fn set_enabled(self: &Arc<Self>, enabled: bool) -> Option<JoinHandle<Result<Payload>>> {
		let was = self.enabled.swap(enabled, Ordering::SeqCst);
		if enabled && !was && !self.options.manual {
			return Some(self.spawn_run());
		}
		None
	}

	fn spawn_run(self: &Arc<Self>) -> JoinHandle<Result<Payload>> {
		let coordinator = Arc::clone(self);
		tokio::spawn(async move { coordinator.run().await })
	}

	/// Runs the request, superseding any run still in flight.
	///
	/// A superseded or cancelled run resolves with [`Error::Cancelled`] and
	/// leaves state, cache and callbacks untouched.
	pub async fn run(&self) -> Result<Payload> {
		let (generation, signal) = self.begin();
		let outcome = self.execute(&signal).await;
		self.finish(generation, &signal, outcome)
	}

	/// Overwrites the current result and its cache entry without a request.
	pub fn mutate(&self, value: Payload) {
		if let Some(key) = self.cache_key() {
			self.cache.set(key, value.clone(), self.options.cache_ttl);
		}
		self.state_tx.send_modify(|state| {
			state.data = Some(value);
			state.error = None;
		});
	}

	/// Cancels the in-flight run and any pending retry.
	pub fn cancel(&self) {
		let active = self.active.lock().take();
		if let Some(active) = active {
			tracing::debug!(path = self.descriptor.path(), "fetch cancelled");
			active.cancel.cancel();
			self.state_tx.send_modify(|state| state.loading = false);
		}
	}

	/// Cancels and returns to the pre-fetch state.
	pub fn reset(&self) {
		self.cancel();
		self.state_tx.send_replace(FetchState::default());
	}

	fn begin(&self) -> (u64, CancelSignal) {
		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		let cancel = CancelHandle::new();
		let signal = cancel.signal();

		let previous = self.active.lock().replace(ActiveRun { generation, cancel });
		if let Some(previous) = previous {
			tracing::debug!(path = self.descriptor.path(), "superseding in-flight fetch");
			previous.cancel.cancel();
		}

		self.state_tx.send_modify(|state| {
			state.loading = true;
			state.error = None;
		});
		(generation, signal)
	}

	async fn execute(&self, signal: &CancelSignal) -> Result<Fetched> {
		if self.descriptor.auth_required() && !self.session.is_authenticated() {
			if !self.options.wait_for_auth {
				return Err(Error::NotAuthenticated(format!(
					"{} {} requires a session",
					self.descriptor.method(),
					self.descriptor.path()
				)));
			}
			tracing::debug!(path = self.descriptor.path(), "waiting for authentication");
			tokio::select! {
				biased;
				_ = signal.cancelled() => return Err(Error::Cancelled),
				ready = self.session.wait_until_authenticated() => ready?,
			}
		}

		if let Some(key) = self.cache_key() {
			if let Some(data) = self.cache.get(&key) {
				tracing::debug!(key, "cache hit");
				return Ok(Fetched {
					data,
					status: None,
					from_cache: true,
				});
			}
		}

		let envelope = self.call_with_retries(signal).await?;
		Ok(Fetched {
			data: envelope.data,
			status: Some(envelope.status),
			from_cache: false,
		})
	}

	async fn call_with_retries(&self, signal: &CancelSignal) -> Result<ResponseEnvelope> {
		let retries = self.descriptor.retries().unwrap_or(self.options.retries);
		let mut attempt = 0u32;

		loop {
			match self.call_once(signal).await {
				Ok(envelope) => return Ok(envelope),
				Err(err) if attempt < retries && err.is_retryable(self.options.retry_system_errors) => {
					let delay = self.options.backoff(attempt);
					tracing::debug!(
						path = self.descriptor.path(),
						attempt,
						delay_ms = delay.as_millis() as u64,
						error = %err,
						"retrying request"
					);
					tokio::select! {
						biased;
						_ = signal.cancelled() => return Err(Error::Cancelled),
						_ = tokio::time::sleep(delay) => {}
					}
					attempt += 1;
				}
				Err(err) => return Err(err),
			}
		}
	}

	/// One attempt, joined with any identical call already in flight.
	///
	/// The shared call runs with only its own timeout; this caller's
	/// cancellation drops its handle, and the call aborts once every joined
	/// caller has done the same.
	async fn call_once(&self, signal: &CancelSignal) -> Result<ResponseEnvelope> {
		let signature = self.descriptor.signature();
		let transport = Arc::clone(&self.transport);
		let descriptor = self.descriptor.clone();

		let pending = self.pending.join_or_start(&signature, move || {
			async move {
				transport
					.execute(descriptor, CancelSignal::never())
					.await
					.map_err(Error::from)
			}
			.boxed()
		});
		if pending.joined {
			tracing::debug!(%signature, "joined pending request");
		}

		tokio::select! {
			biased;
			_ = signal.cancelled() => Err(Error::Cancelled),
			result = pending.call => result,
		}
	}

	fn finish(&self, generation: u64, signal: &CancelSignal, outcome: Result<Fetched>) -> Result<Payload> {
		let mut active = self.active.lock();
		let current = active.as_ref().is_some_and(|run| run.generation == generation);
		if !current || signal.is_cancelled() {
			return Err(Error::Cancelled);
		}
		*active = None;

		match outcome {
			Ok(fetched) => {
				if !fetched.from_cache {
					if let Some(key) = self.cache_key() {
						self.cache.set(key, fetched.data.clone(), self.options.cache_ttl);
					}
				}
				self.state_tx.send_modify(|state| {
					state.data = Some(fetched.data.clone());
					state.error = None;
					state.loading = false;
					state.status = fetched.status;
				});
				drop(active);

				if let Some(on_success) = &self.options.on_success {
					on_success(&fetched.data);
				}
				if let Some(on_settled) = &self.options.on_settled {
					on_settled(Ok(&fetched.data));
				}
				Ok(fetched.data)
			}
			Err(err) => {
				self.state_tx.send_modify(|state| {
					state.error = Some(err.clone());
					state.loading = false;
					state.status = err.status();
				});
				drop(active);

				tracing::debug!(path = self.descriptor.path(), error = %err, "fetch failed");
				// Only a rejected credential ends the session; a public or
				// third-party 401 says nothing about it.
				if self.descriptor.auth_required() && err.status() == Some(401) {
					self.session.handle_unauthorized();
				}
				if let Some(on_error) = &self.options.on_error {
					on_error(&err);
				}
				if let Some(on_settled) = &self.options.on_settled {
					on_settled(Err(&err));
				}
				Err(err)
			}
		}
	}
}

impl Drop for FetchCoordinator {
	fn drop(&mut self) {
		if let Some(active) = self.active.get_mut().take() {
			active.cancel.cancel();
		}
	}
}

impl std::fmt::Debug for FetchCoordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FetchCoordinator")
			.field("method", &self.descriptor.method())
			.field("path", &self.descriptor.path())
			.field("options", &self.options)
			.field("state", &*self.state_tx.borrow())
			.finish_non_exhaustive()
	}
}
