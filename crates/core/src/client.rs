//! Composition root.
//!
//! A [`Client`] owns one transport stack, one session manager, one result
//! cache and one pending registry, and hands them to every coordinator it
//! creates.

use std::sync::Arc;

use fk_protocol::{Payload, RequestDescriptor, ResponseEnvelope};
use fk_runtime::{
	CancelSignal, HttpTransport, InterceptedTransport, MemoryStorage, PendingRegistry, Result, ResultCache,
	SharedClock, SharedTransport, StoragePort, SystemClock, Transport,
};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::coordinator::{FetchCoordinator, FetchOptions};
use crate::session::SessionManager;

/// Builds a [`Client`], optionally swapping the transport, storage or clock.
pub struct ClientBuilder {
	config: ClientConfig,
	transport: Option<SharedTransport>,
	storage: Option<Arc<dyn StoragePort>>,
	clock: Option<SharedClock>,
}

impl ClientBuilder {
	pub fn new(config: ClientConfig) -> Self {
		Self {
			config,
			transport: None,
			storage: None,
			clock: None,
		}
	}

	/// Replaces the reqwest transport. Interceptors still wrap it.
	pub fn with_transport(mut self, transport: SharedTransport) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Defaults to a fresh [`MemoryStorage`].
	pub fn with_storage(mut self, storage: Arc<dyn StoragePort>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn with_clock(mut self, clock: SharedClock) -> Self {
		self.clock = Some(clock);
		self
	}

	/// Assembles the client. The session starts logged out; call
	/// [`SessionManager::restore`] to pick up a persisted one.
	pub fn build(self) -> Result<Client> {
		let Self {
			config,
			transport,
			storage,
			clock,
		} = self;

		let clock = clock.unwrap_or_else(SystemClock::shared);
		let inner: SharedTransport = match transport {
			Some(transport) => transport,
			None => Arc::new(HttpTransport::new(config.transport_config())?),
		};
		let transport = Arc::new(InterceptedTransport::new(inner));
		let storage: Arc<dyn StoragePort> = match storage {
			Some(storage) => storage,
			None => Arc::new(MemoryStorage::new()),
		};

		let session = SessionManager::new(
			transport.clone(),
			storage,
			Arc::clone(&clock),
			config.session.clone(),
			&config.storage_prefix,
		);
		transport.add_request_interceptor(session.authorization_interceptor());

		let cache = Arc::new(ResultCache::with_default_ttl(clock, config.cache_ttl()));
		tracing::debug!(base_url = %config.base_url, "client ready");

		Ok(Client {
			config,
			transport,
			session,
			cache,
			pending: PendingRegistry::new(),
		})
	}
}

/// Entry point for issuing requests and managing the session.
pub struct Client {
	config: ClientConfig,
	transport: Arc<InterceptedTransport>,
	session: Arc<SessionManager>,
	cache: Arc<ResultCache>,
	pending: Arc<PendingRegistry>,
}

impl Client {
	/// Builds a client over reqwest with in-memory storage.
	pub fn new(config: ClientConfig) -> Result<Self> {
		ClientBuilder::new(config).build()
	}

	pub fn builder(config: ClientConfig) -> ClientBuilder {
		ClientBuilder::new(config)
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Transport with the interceptor pipeline; add interceptors here.
	pub fn transport(&self) -> &Arc<InterceptedTransport> {
		&self.transport
	}

	pub fn session(&self) -> &Arc<SessionManager> {
		&self.session
	}

	pub fn cache(&self) -> &Arc<ResultCache> {
		&self.cache
	}

	pub fn pending(&self) -> &Arc<PendingRegistry> {
		&self.pending
	}

	/// Creates a coordinator sharing this client's cache and registry.
	pub fn coordinator(&self, descriptor: RequestDescriptor, options: FetchOptions) -> Arc<FetchCoordinator> {
		FetchCoordinator::new(
			self.transport.clone(),
			Arc::clone(&self.session),
			Arc::clone(&self.cache),
			Arc::clone(&self.pending),
			descriptor,
			options,
		)
	}

	/// Runs `descriptor` once through a coordinator.
	pub async fn fetch(&self, descriptor: RequestDescriptor, options: FetchOptions) -> Result<Payload> {
		let options = FetchOptions {
			immediate: false,
			manual: true,
			..options
		};
		self.coordinator(descriptor, options).run().await
	}

	/// Like [`fetch`](Self::fetch) with default options, decoding JSON.
	pub async fn fetch_json<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> Result<T> {
		let payload = self.fetch(descriptor, FetchOptions::manual()).await?;
		Ok(payload.decode()?)
	}

	/// Sends `descriptor` straight through the transport: no cache, dedup
	/// or retries.
	pub async fn send(&self, descriptor: RequestDescriptor) -> Result<ResponseEnvelope> {
		Ok(self.transport.execute(descriptor, CancelSignal::never()).await?)
	}
}

impl std::fmt::Debug for Client {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Client")
			.field("base_url", &self.config.base_url)
			.field("session", &self.session)
			.field("cached", &self.cache.len())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use fk_protocol::{Credentials, Method, endpoints};
	use fk_runtime::{Clock, ErrorKind};
	use serde::Deserialize;
	use serde_json::json;

	use super::*;
	use crate::testing::MockTransport;

	fn client(mock: &Arc<MockTransport>) -> Client {
		Client::builder(ClientConfig::default().with_cache_ttl(Duration::from_secs(10)))
			.with_transport(mock.clone())
			.build()
			.unwrap()
	}

	#[derive(Debug, Deserialize, PartialEq)]
	struct Post {
		id: u32,
		title: String,
	}

	#[tokio::test(start_paused = true)]
	async fn fetch_json_decodes_payload() {
		let mock = MockTransport::new();
		mock.respond_json(Method::Get, "/posts/1", json!({"id": 1, "title": "Hello"}));
		let client = client(&mock);

		let post: Post = client.fetch_json(RequestDescriptor::get("/posts/1")).await.unwrap();
		assert_eq!(post, Post { id: 1, title: "Hello".into() });

		let err = client
			.fetch_json::<Post>(RequestDescriptor::get("/missing"))
			.await
			.unwrap_err();
		assert_eq!(err.status(), Some(404));
	}

	#[tokio::test(start_paused = true)]
	async fn authenticated_descriptors_carry_the_session_token() {
		let mock = MockTransport::new();
		let client = client(&mock);
		let now = SystemClock::new().now_ms();
		mock.respond_json(
			Method::Post,
			endpoints::LOGIN,
			json!({
				"user": {"id": "u1", "name": "Ada"},
				"token": {"accessToken": "abc", "expiresAt": now + 3_600_000}
			}),
		);
		mock.respond_json(Method::Get, "/me/orders", json!([]));
		mock.respond_json(Method::Get, "/public", json!([]));

		client
			.session()
			.login(&Credentials::new("ada@example.com", "pw"))
			.await
			.unwrap();
		client.send(RequestDescriptor::get("/me/orders").authenticated()).await.unwrap();
		client.send(RequestDescriptor::get("/public")).await.unwrap();

		let calls = mock.calls();
		let orders = calls.iter().find(|d| d.path() == "/me/orders").unwrap();
		let public = calls.iter().find(|d| d.path() == "/public").unwrap();
		assert_eq!(orders.headers().get("Authorization"), Some("Bearer abc"));
		assert!(!public.headers().contains("authorization"));
	}

	#[tokio::test(start_paused = true)]
	async fn cache_uses_configured_ttl() {
		let mock = MockTransport::new();
		mock.respond_json(Method::Get, "/feed", json!([1]));
		let client = client(&mock);
		assert_eq!(client.cache().default_ttl(), Duration::from_secs(10));

		let options = FetchOptions::manual().with_cache_key("feed");
		client.fetch(RequestDescriptor::get("/feed"), options.clone()).await.unwrap();
		client.fetch(RequestDescriptor::get("/feed"), options.clone()).await.unwrap();
		assert_eq!(mock.calls_to("/feed"), 1);

		tokio::time::advance(Duration::from_secs(11)).await;
		client.fetch(RequestDescriptor::get("/feed"), options).await.unwrap();
		assert_eq!(mock.calls_to("/feed"), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn interceptors_added_on_the_client_apply_to_fetches() {
		let mock = MockTransport::new();
		mock.respond_json(Method::Get, "/x", json!(null));
		let client = client(&mock);
		client
			.transport()
			.add_request_interceptor(|d: RequestDescriptor| Ok(d.with_header("X-Trace", "t1")));

		client.fetch(RequestDescriptor::get("/x"), FetchOptions::new()).await.unwrap();
		assert_eq!(mock.calls()[0].headers().get("x-trace"), Some("t1"));

		let err = client
			.fetch(RequestDescriptor::get("/private").authenticated(), FetchOptions::new())
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Authentication);
		assert_eq!(mock.calls().len(), 1);
	}
}
