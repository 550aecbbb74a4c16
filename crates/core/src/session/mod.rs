//! Session manager.
//!
//! Owns the authentication state machine (`LoggedOut → Authenticating →
//! Authenticated ⇄ Refreshing`), the current user and token, the expiry
//! countdown and the offline-action queue.
//!
//! Every change builds a fresh [`SessionState`] and publishes it twice: on a
//! [`watch`] channel for async observers and to callbacks registered with
//! [`SessionManager::on_state_change`]. Expiry warnings and token refreshes
//! have their own callback channels.
//!
//! Token, user and offline queue are persisted through a [`StoragePort`].
//! Writes made by another context sharing the same backend are picked up
//! through the port's change notification, so two contexts never disagree
//! about who is logged in for longer than one notification.

mod countdown;
mod lease;
mod offline;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fk_protocol::{
	AuthResponse, AuthToken, Credentials, OfflineAction, RefreshRequest, RequestDescriptor, SessionState,
	SessionStatus, User, ValidateResponse, endpoints,
};
use fk_runtime::handlers::{HandlerMap, dispatch, handler_map, register};
use fk_runtime::{
	CancelSignal, Error, ErrorKind, Result, SharedClock, SharedTransport, StorageChange, StoragePort, Subscription,
	TransportError, read_json, write_json,
};
pub use offline::{OfflineReplayer, ReplayFuture, SyncReport, TransportReplayer};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;

static NEXT_HOLDER: AtomicU64 = AtomicU64::new(1);

/// Storage keys used by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
	pub token: String,
	pub user: String,
	pub offline_queue: String,
	pub refresh_lock: String,
}

impl StorageKeys {
	pub fn new(prefix: &str) -> Self {
		Self {
			token: format!("{prefix}token"),
			user: format!("{prefix}user"),
			offline_queue: format!("{prefix}offline_queue"),
			refresh_lock: format!("{prefix}refresh_lock"),
		}
	}
}

struct Inner {
	user: Option<User>,
	token: Option<AuthToken>,
	status: SessionStatus,
	loading: bool,
	online: bool,
	remaining_ms: u64,
	/// Expiry warning already fired for the current token.
	warned: bool,
	/// Automatic refresh already attempted for the current token.
	auto_refreshed: bool,
	queue: Vec<OfflineAction>,
	next_action_id: u64,
	/// Bumped whenever the session ends or a login starts. An exchange
	/// that began under an older epoch must not install its result.
	epoch: u64,
}

impl Inner {
	fn new() -> Self {
		Self {
			user: None,
			token: None,
			status: SessionStatus::LoggedOut,
			loading: false,
			online: true,
			remaining_ms: 0,
			warned: false,
			auto_refreshed: false,
			queue: Vec::new(),
			next_action_id: 1,
			epoch: 0,
		}
	}

	fn is_authenticated(&self) -> bool {
		self.token.is_some() && matches!(self.status, SessionStatus::Authenticated | SessionStatus::Refreshing)
	}

	fn clear(&mut self) {
		self.user = None;
		self.token = None;
		self.status = SessionStatus::LoggedOut;
		self.loading = false;
		self.remaining_ms = 0;
		self.warned = false;
		self.auto_refreshed = false;
		self.epoch += 1;
	}

	fn snapshot(&self) -> SessionState {
		SessionState {
			user: self.user.clone(),
			token: self.token.clone(),
			is_authenticated: self.is_authenticated(),
			is_session_loading: self.loading,
			remaining_session_ms: self.remaining_ms,
			is_network_online: self.online,
			status: self.status,
		}
	}
}

/// Authentication state machine and offline queue.
///
/// Always held in an [`Arc`]; background work (countdown, automatic refresh,
/// reconnect sync) keeps only weak or cloned handles.
pub struct SessionManager {
	transport: SharedTransport,
	storage: Arc<dyn StoragePort>,
	clock: SharedClock,
	config: SessionConfig,
	keys: StorageKeys,
	/// Identifies this manager in refresh leases.
	holder: String,
	inner: Mutex<Inner>,
	state_tx: watch::Sender<Arc<SessionState>>,
	state_handlers: HandlerMap<SessionState>,
	expiring_handlers: HandlerMap<u64>,
	refreshed_handlers: HandlerMap<AuthToken>,
	refresh_lock: tokio::sync::Mutex<()>,
	sync_lock: tokio::sync::Mutex<()>,
	queue_write: Mutex<()>,
	replayer: RwLock<Arc<dyn OfflineReplayer>>,
	countdown: Mutex<Option<JoinHandle<()>>>,
	/// Serializes installing or ending a session with the epoch check.
	/// Reentrant so state listeners may log out from inside a commit.
	commit_lock: ReentrantMutex<()>,
	_storage_subscription: Subscription,
}

impl SessionManager {
	/// Creates a logged-out manager. Call [`restore`](Self::restore) to pick
	/// up a persisted session.
	pub fn new(
		transport: SharedTransport,
		storage: Arc<dyn StoragePort>,
		clock: SharedClock,
		config: SessionConfig,
		storage_prefix: &str,
	) -> Arc<Self> {
		let replayer: Arc<dyn OfflineReplayer> = Arc::new(TransportReplayer::new(Arc::clone(&transport)));
		let (state_tx, _) = watch::channel(Arc::new(Inner::new().snapshot()));
		let holder = format!("{}-{}", std::process::id(), NEXT_HOLDER.fetch_add(1, Ordering::SeqCst));

		Arc::new_cyclic(|weak: &Weak<Self>| {
			let weak = weak.clone();
			let subscription = storage.on_external_change(Arc::new(move |change: &StorageChange| {
				if let Some(session) = weak.upgrade() {
					session.on_storage_change(change);
				}
			}));

			Self {
				transport,
				storage,
				clock,
				config,
				keys: StorageKeys::new(storage_prefix),
				holder,
				inner: Mutex::new(Inner::new()),
				state_tx,
				state_handlers: handler_map(),
				expiring_handlers: handler_map(),
				refreshed_handlers: handler_map(),
				refresh_lock: tokio::sync::Mutex::new(()),
				sync_lock: tokio::sync::Mutex::new(()),
				queue_write: Mutex::new(()),
				replayer: RwLock::new(replayer),
				countdown: Mutex::new(None),
				commit_lock: ReentrantMutex::new(()),
				_storage_subscription: subscription,
			}
		})
	}

	/// Current snapshot.
	pub fn state(&self) -> Arc<SessionState> {
		self.state_tx.borrow().clone()
	}

	/// Receiver that observes every published snapshot.
	pub fn subscribe(&self) -> watch::Receiver<Arc<SessionState>> {
		self.state_tx.subscribe()
	}

	pub fn on_state_change<F>(&self, f: F) -> Subscription
	where
		F: Fn(&SessionState) + Send + Sync + 'static,
	{
		register(&self.state_handlers, (), f)
	}

	/// Fires once per token lifetime with the remaining milliseconds.
	pub fn on_expiring_soon<F>(&self, f: F) -> Subscription
	where
		F: Fn(&u64) + Send + Sync + 'static,
	{
		register(&self.expiring_handlers, (), f)
	}

	pub fn on_token_refreshed<F>(&self, f: F) -> Subscription
	where
		F: Fn(&AuthToken) + Send + Sync + 'static,
	{
		register(&self.refreshed_handlers, (), f)
	}

	pub fn is_authenticated(&self) -> bool {
		self.inner.lock().is_authenticated()
	}

	pub fn is_online(&self) -> bool {
		self.inner.lock().online
	}

	pub fn current_user(&self) -> Option<User> {
		self.inner.lock().user.clone()
	}

	pub fn current_token(&self) -> Option<AuthToken> {
		self.inner.lock().token.clone()
	}

	/// `Authorization` header value for the current token.
	pub fn authorization(&self) -> Option<String> {
		self.inner.lock().token.as_ref().map(AuthToken::authorization)
	}

	pub fn keys(&self) -> &StorageKeys {
		&self.keys
	}

	pub fn has_role(&self, role: &str) -> bool {
		self.inner.lock().user.as_ref().is_some_and(|user| user.has_role(role))
	}

	pub fn has_permission(&self, permission: &str) -> bool {
		self.inner
			.lock()
			.user
			.as_ref()
			.is_some_and(|user| user.has_permission(permission))
	}

	/// Replaces the offline replayer. The default replays `request` actions
	/// through the session's transport.
	pub fn set_replayer(&self, replayer: Arc<dyn OfflineReplayer>) {
		*self.replayer.write() = replayer;
	}

	/// Request interceptor that attaches `Authorization` to auth-required
	/// descriptors that do not carry one.
	pub fn authorization_interceptor(
		self: &Arc<Self>,
	) -> impl Fn(RequestDescriptor) -> std::result::Result<RequestDescriptor, TransportError> + Send + Sync + 'static
	{
		let session = Arc::downgrade(self);
		move |descriptor: RequestDescriptor| {
			if !descriptor.auth_required() || descriptor.headers().contains("authorization") {
				return Ok(descriptor);
			}
			match session.upgrade().and_then(|session| session.authorization()) {
				Some(value) => Ok(descriptor.with_header("Authorization", value)),
				None => Ok(descriptor),
			}
		}
	}

	/// Resolves once the session is authenticated.
	pub async fn wait_until_authenticated(&self) -> Result<()> {
		let mut rx = self.state_tx.subscribe();
		rx.wait_for(|state| state.is_authenticated)
			.await
			.map(|_| ())
			.map_err(|_| Error::Internal("session manager closed".into()))
	}

	/// Exchanges credentials for a session.
	pub async fn login(self: &Arc<Self>, credentials: &Credentials) -> Result<User> {
		let descriptor = RequestDescriptor::post(endpoints::LOGIN).with_json_body(credentials)?;
		let epoch = self.update(|inner| {
			inner.epoch += 1;
			inner.status = SessionStatus::Authenticating;
			inner.loading = true;
			inner.epoch
		});
		tracing::info!(email = %credentials.email, "logging in");

		let outcome = self.call::<AuthResponse>(descriptor).await.and_then(|response| {
			let user = response
				.user
				.ok_or_else(|| Error::Internal("login response carried no user".into()))?;
			Ok((user, response.token))
		});

		let _commit = self.commit_lock.lock();
		if self.epoch() != epoch {
			tracing::info!("session changed during login; discarding result");
			return Err(Error::NotAuthenticated("session ended during login".into()));
		}

		match outcome {
			Ok((user, token)) => {
				self.persist_session(Some(&user), &token);
				self.install(Some(user.clone()), token);
				tracing::info!(user = %user.id, "logged in");
				Ok(user)
			}
			Err(err) => {
				tracing::warn!(error = %err, "login failed");
				// A previous session must not survive in storage either; the
				// offline queue is kept.
				self.end_session(false);
				self.remove_keys(&[&self.keys.user, &self.keys.token]);
				Err(err)
			}
		}
	}

	/// Ends the session. The server is told on a best-effort basis; local
	/// state and storage are cleared regardless.
	pub async fn logout(&self) {
		if let Ok(descriptor) = self.authorized(RequestDescriptor::post(endpoints::LOGOUT)) {
			if let Err(err) = self.transport.execute(descriptor, CancelSignal::never()).await {
				tracing::error!(error = %err, "logout request failed");
			}
		}
		self.end_session(true);
		tracing::info!("logged out");
	}

	/// Exchanges the refresh credential for a new token.
	///
	/// Concurrent callers share one exchange. Failure ends the session.
	pub async fn refresh(self: &Arc<Self>) -> Result<AuthToken> {
		match self.run_refresh(false).await? {
			Some(token) => Ok(token),
			None => self
				.current_token()
				.ok_or_else(|| Error::NotAuthenticated("no session to refresh".into())),
		}
	}

	async fn run_refresh(self: &Arc<Self>, automatic: bool) -> Result<Option<AuthToken>> {
		let observed = self.current_token().map(|token| token.fingerprint());
		let _guard = self.refresh_lock.lock().await;

		let current = self
			.current_token()
			.ok_or_else(|| Error::NotAuthenticated("no session to refresh".into()))?;
		let token_id = current.fingerprint();
		if observed.as_deref().is_some_and(|seen| seen != token_id) {
			tracing::debug!("token already refreshed by a concurrent caller");
			return Ok(Some(current));
		}

		match lease::try_acquire(
			&*self.storage,
			&self.keys.refresh_lock,
			&token_id,
			&self.holder,
			self.clock.now_ms(),
			self.config.refresh_lease(),
		) {
			Ok(true) => {}
			Ok(false) if automatic => {
				tracing::info!("refresh already in progress in another context");
				return Ok(None);
			}
			Ok(false) => tracing::debug!("refreshing despite another context's lease"),
			Err(err) => tracing::warn!(error = %err, "refresh lease unavailable"),
		}

		let Some(refresh_token) = current.refresh_token.clone() else {
			self.release_lease();
			tracing::warn!("session has no refresh credential; ending session");
			self.end_session(true);
			return Err(Error::NotAuthenticated("session has no refresh credential".into()));
		};
		let descriptor = RequestDescriptor::post(endpoints::REFRESH).with_json_body(&RefreshRequest { refresh_token })?;

		let epoch = self.update(|inner| {
			inner.status = SessionStatus::Refreshing;
			inner.epoch
		});
		let outcome = self.call::<AuthResponse>(descriptor).await;
		self.release_lease();

		let _commit = self.commit_lock.lock();
		if self.epoch() != epoch {
			tracing::info!("session ended during refresh; discarding result");
			return Err(Error::NotAuthenticated("session ended during refresh".into()));
		}

		match outcome {
			Ok(response) => {
				let token = response.token;
				self.persist_session(response.user.as_ref(), &token);
				self.install(response.user, token.clone());
				dispatch(&self.refreshed_handlers, &token);
				tracing::info!(automatic, "token refreshed");
				Ok(Some(token))
			}
			Err(err) => {
				tracing::warn!(error = %err, "token refresh failed; ending session");
				self.end_session(true);
				Err(err)
			}
		}
	}

	/// Rehydrates a persisted session. Expired tokens are discarded.
	///
	/// Returns true if a session was restored.
	pub fn restore(self: &Arc<Self>) -> Result<bool> {
		let queue: Vec<OfflineAction> = read_json(&*self.storage, &self.keys.offline_queue)?.unwrap_or_default();
		self.load_queue(queue);

		let Some(token) = read_json::<AuthToken>(&*self.storage, &self.keys.token)? else {
			return Ok(false);
		};
		if token.is_expired(self.clock.now_ms()) {
			tracing::info!("discarding expired stored session");
			self.remove_keys(&[&self.keys.token, &self.keys.user]);
			return Ok(false);
		}

		let user = read_json::<User>(&*self.storage, &self.keys.user)?;
		self.install(user, token);
		tracing::info!("session restored");
		Ok(true)
	}

	/// Asks the server whether the current token is still valid. A negative
	/// answer ends the session locally.
	pub async fn validate(&self) -> Result<bool> {
		let Ok(descriptor) = self.authorized(RequestDescriptor::post(endpoints::VALIDATE)) else {
			return Ok(false);
		};
		match self.call::<ValidateResponse>(descriptor).await {
			Ok(response) if response.valid => Ok(true),
			Ok(_) => {
				tracing::info!("server reports session invalid");
				self.end_session(true);
				Ok(false)
			}
			Err(err) if err.kind() == ErrorKind::Authentication => {
				tracing::info!(error = %err, "session rejected during validation");
				self.end_session(true);
				Ok(false)
			}
			Err(err) => Err(err),
		}
	}

	/// Reloads the current user's profile.
	pub async fn fetch_current_user(&self) -> Result<User> {
		let descriptor = self.authorized(RequestDescriptor::get(endpoints::ME))?;
		let user: User = self.call_authorized(descriptor).await?;
		self.set_user(user.clone());
		Ok(user)
	}

	/// Sends profile changes and installs the user the server returns.
	pub async fn update_profile(&self, changes: Value) -> Result<User> {
		let descriptor = self.authorized(RequestDescriptor::put(endpoints::ME).with_json(changes))?;
		let user: User = self.call_authorized(descriptor).await?;
		self.set_user(user.clone());
		Ok(user)
	}

	/// Ends the session after the server rejected its credential.
	pub fn handle_unauthorized(&self) {
		if self.is_authenticated() {
			tracing::warn!("request rejected as unauthenticated; ending session");
			self.end_session(true);
		}
	}

	/// Records connectivity. Coming back online replays the offline queue.
	pub fn set_online(self: &Arc<Self>, online: bool) {
		if self.inner.lock().online == online {
			return;
		}
		self.update(|inner| inner.online = online);
		tracing::info!(online, "network status changed");

		if online {
			let Ok(runtime) = tokio::runtime::Handle::try_current() else {
				tracing::warn!("no runtime to replay offline actions on");
				return;
			};
			let session = Arc::clone(self);
			runtime.spawn(async move {
				session.sync_offline_actions().await;
			});
		}
	}

	/// Appends an action to the offline queue and persists the queue.
	pub fn queue_offline_action(&self, kind: impl Into<String>, payload: Value) -> OfflineAction {
		let now = self.clock.now_ms();
		let action = {
			let mut inner = self.inner.lock();
			let id = inner.next_action_id;
			inner.next_action_id += 1;
			let action = OfflineAction::new(id, kind, payload, now);
			inner.queue.push(action.clone());
			action
		};
		self.persist_queue();
		tracing::debug!(id = action.id, kind = %action.kind, "queued offline action");
		action
	}

	/// Queues `descriptor` for replay through the transport.
	pub fn queue_request(&self, descriptor: &RequestDescriptor) -> Result<OfflineAction> {
		let payload = serde_json::to_value(descriptor)?;
		Ok(self.queue_offline_action(OfflineAction::REQUEST_KIND, payload))
	}

	pub fn offline_actions(&self) -> Vec<OfflineAction> {
		self.inner.lock().queue.clone()
	}

	/// Replays queued actions in insertion order.
	///
	/// Successful actions leave the queue; failed ones stay in place. A no-op
	/// while offline or with an empty queue.
	pub async fn sync_offline_actions(&self) -> SyncReport {
		let _guard = self.sync_lock.lock().await;
		let (online, actions) = {
			let inner = self.inner.lock();
			(inner.online, inner.queue.clone())
		};
		if !online || actions.is_empty() {
			return SyncReport::default();
		}

		let replayer = self.replayer.read().clone();
		let mut report = SyncReport::default();
		for action in &actions {
			match replayer.replay(action).await {
				Ok(()) => report.replayed.push(action.id),
				Err(err) => {
					tracing::warn!(id = action.id, kind = %action.kind, error = %err, "offline action failed");
					report.failed.push(action.id);
				}
			}
		}

		self.inner
			.lock()
			.queue
			.retain(|action| !report.replayed.contains(&action.id));
		self.persist_queue();
		tracing::info!(
			replayed = report.replayed.len(),
			failed = report.failed.len(),
			"offline sync finished"
		);
		report
	}

	/// Applies one countdown tick. Returns false once the countdown should stop.
	fn tick(self: &Arc<Self>) -> bool {
		let now = self.clock.now_ms();
		let step = {
			let mut inner = self.inner.lock();
			if !inner.is_authenticated() {
				return false;
			}
			let (remaining, can_refresh) = match inner.token.as_ref() {
				Some(token) => (token.remaining_ms(now), token.refresh_token.is_some()),
				None => return false,
			};
			inner.remaining_ms = remaining;

			if remaining == 0 {
				None
			} else {
				let warn = !inner.warned && remaining <= self.config.warning_threshold_ms;
				inner.warned |= warn;
				let refresh = !inner.auto_refreshed
					&& can_refresh
					&& inner.status == SessionStatus::Authenticated
					&& remaining <= self.config.auto_refresh_threshold_ms;
				inner.auto_refreshed |= refresh;
				Some((remaining, warn, refresh, inner.snapshot()))
			}
		};

		let Some((remaining, warn, refresh, snapshot)) = step else {
			tracing::info!("session expired");
			self.end_session(true);
			return false;
		};

		self.publish(snapshot);
		if warn {
			tracing::info!(remaining_ms = remaining, "session expiring soon");
			dispatch(&self.expiring_handlers, &remaining);
		}
		if refresh {
			let session = Arc::clone(self);
			tokio::spawn(async move {
				if let Err(err) = session.run_refresh(true).await {
					tracing::warn!(error = %err, "automatic refresh failed");
				}
			});
		}
		true
	}

	fn on_storage_change(self: &Arc<Self>, change: &StorageChange) {
		if change.key == self.keys.token {
			match change.new_value.as_deref().map(serde_json::from_str::<AuthToken>) {
				None => {
					if self.is_authenticated() {
						tracing::info!("session ended in another context");
						self.end_session(false);
					}
				}
				Some(Ok(token)) => {
					let previous = self.current_token();
					if previous.as_ref() == Some(&token) {
						return;
					}
					let user = read_json::<User>(&*self.storage, &self.keys.user).ok().flatten();
					tracing::info!("session updated in another context");
					self.install(user, token.clone());
					if previous.is_some() {
						dispatch(&self.refreshed_handlers, &token);
					}
				}
				Some(Err(err)) => tracing::warn!(error = %err, "ignoring undecodable token from another context"),
			}
		} else if change.key == self.keys.user {
			if let Some(Ok(user)) = change.new_value.as_deref().map(serde_json::from_str::<User>) {
				if self.is_authenticated() {
					self.update(|inner| inner.user = Some(user));
				}
			}
		} else if change.key == self.keys.offline_queue {
			let queue = change
				.new_value
				.as_deref()
				.and_then(|raw| serde_json::from_str::<Vec<OfflineAction>>(raw).ok())
				.unwrap_or_default();
			self.load_queue(queue);
		}
	}

	/// Makes `token` current and starts the countdown. `None` keeps the
	/// current user.
	fn install(self: &Arc<Self>, user: Option<User>, token: AuthToken) {
		let remaining = token.remaining_ms(self.clock.now_ms());
		self.update(|inner| {
			if user.is_some() {
				inner.user = user;
			}
			inner.token = Some(token);
			inner.status = SessionStatus::Authenticated;
			inner.loading = false;
			inner.remaining_ms = remaining;
			inner.warned = false;
			inner.auto_refreshed = false;
		});
		self.start_countdown();
	}

	/// Clears the local session; with `clear_storage`, also the persisted
	/// token, user and offline queue.
	fn end_session(&self, clear_storage: bool) {
		let _commit = self.commit_lock.lock();
		self.stop_countdown();
		self.update(|inner| {
			inner.clear();
			if clear_storage {
				inner.queue.clear();
			}
		});
		if clear_storage {
			self.remove_keys(&[&self.keys.user, &self.keys.token, &self.keys.offline_queue]);
		}
	}

	fn set_user(&self, user: User) {
		if let Err(err) = write_json(&*self.storage, &self.keys.user, &user) {
			tracing::warn!(error = %err, "failed to persist user");
		}
		self.update(|inner| inner.user = Some(user));
	}

	fn load_queue(&self, queue: Vec<OfflineAction>) {
		let mut inner = self.inner.lock();
		let next = queue.iter().map(|action| action.id + 1).max().unwrap_or(1);
		inner.next_action_id = inner.next_action_id.max(next);
		inner.queue = queue;
	}

	fn persist_session(&self, user: Option<&User>, token: &AuthToken) {
		if let Some(user) = user {
			if let Err(err) = write_json(&*self.storage, &self.keys.user, user) {
				tracing::warn!(error = %err, "failed to persist user");
			}
		}
		if let Err(err) = write_json(&*self.storage, &self.keys.token, token) {
			tracing::warn!(error = %err, "failed to persist token");
		}
	}

	fn persist_queue(&self) {
		let _guard = self.queue_write.lock();
		let queue = self.inner.lock().queue.clone();
		if let Err(err) = write_json(&*self.storage, &self.keys.offline_queue, &queue) {
			tracing::warn!(error = %err, "failed to persist offline queue");
		}
	}

	fn remove_keys(&self, keys: &[&String]) {
		for key in keys {
			if let Err(err) = self.storage.remove(key) {
				tracing::warn!(key = %key, error = %err, "failed to clear stored session key");
			}
		}
	}

	fn release_lease(&self) {
		if let Err(err) = lease::release(&*self.storage, &self.keys.refresh_lock, &self.holder) {
			tracing::warn!(error = %err, "failed to release refresh lease");
		}
	}

	fn start_countdown(self: &Arc<Self>) {
		let mut slot = self.countdown.lock();
		if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
			return;
		}
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			tracing::warn!("no runtime; session countdown not started");
			return;
		};
		*slot = Some(runtime.spawn(countdown::run(Arc::downgrade(self), self.config.tick())));
	}

	fn stop_countdown(&self) {
		if let Some(handle) = self.countdown.lock().take() {
			handle.abort();
		}
	}

	fn epoch(&self) -> u64 {
		self.inner.lock().epoch
	}

	/// Mutates the state under the lock, then publishes the new snapshot.
	fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
		let (result, snapshot) = {
			let mut inner = self.inner.lock();
			let result = f(&mut inner);
			(result, inner.snapshot())
		};
		self.publish(snapshot);
		result
	}

	fn publish(&self, snapshot: SessionState) {
		self.state_tx.send_replace(Arc::new(snapshot.clone()));
		dispatch(&self.state_handlers, &snapshot);
	}

	fn authorized(&self, descriptor: RequestDescriptor) -> Result<RequestDescriptor> {
		let authorization = self
			.authorization()
			.ok_or_else(|| Error::NotAuthenticated("no active session".into()))?;
		Ok(descriptor.authenticated().with_header("Authorization", authorization))
	}

	async fn call<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> Result<T> {
		let envelope = self.transport.execute(descriptor, CancelSignal::never()).await?;
		Ok(envelope.json()?)
	}

	async fn call_authorized<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> Result<T> {
		let outcome = self.call(descriptor).await;
		if let Err(err) = &outcome {
			if err.kind() == ErrorKind::Authentication {
				self.handle_unauthorized();
			}
		}
		outcome
	}
}

impl Drop for SessionManager {
	fn drop(&mut self) {
		if let Some(handle) = self.countdown.get_mut().take() {
			handle.abort();
		}
	}
}

impl std::fmt::Debug for SessionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("SessionManager")
			.field("status", &inner.status)
			.field("user", &inner.user.as_ref().map(|user| &user.id))
			.field("online", &inner.online)
			.field("queued", &inner.queue.len())
			.finish_non_exhaustive()
	}
}
