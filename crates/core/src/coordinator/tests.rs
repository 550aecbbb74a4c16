use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fk_protocol::{Body, CachePolicy, Credentials, Method, Payload, RequestDescriptor, endpoints};
use fk_runtime::{
	Error, ErrorKind, InterceptedTransport, MemoryStorage, PendingRegistry, ResultCache, SharedClock, SystemClock,
	TransportError,
};
use serde_json::json;

use super::*;
use crate::config::SessionConfig;
use crate::testing::MockTransport;

struct Harness {
	mock: Arc<MockTransport>,
	clock: SharedClock,
	transport: Arc<InterceptedTransport>,
	session: Arc<SessionManager>,
	cache: Arc<ResultCache>,
	pending: Arc<PendingRegistry>,
}

impl Harness {
	fn new() -> Self {
		let mock = MockTransport::new();
		let clock = SystemClock::shared();
		let session = SessionManager::new(
			mock.clone(),
			Arc::new(MemoryStorage::new()),
			Arc::clone(&clock),
			SessionConfig::default(),
			"test.",
		);
		let transport = Arc::new(InterceptedTransport::new(mock.clone()));
		transport.add_request_interceptor(session.authorization_interceptor());

		Self {
			mock,
			cache: Arc::new(ResultCache::new(Arc::clone(&clock))),
			clock,
			transport,
			session,
			pending: PendingRegistry::new(),
		}
	}

	fn coordinator(&self, descriptor: RequestDescriptor, options: FetchOptions) -> Arc<FetchCoordinator> {
		FetchCoordinator::new(
			self.transport.clone(),
			Arc::clone(&self.session),
			Arc::clone(&self.cache),
			Arc::clone(&self.pending),
			descriptor,
			options,
		)
	}

	async fn login(&self) {
		self.mock.respond_json(
			Method::Post,
			endpoints::LOGIN,
			json!({
				"user": {"id": "u1", "name": "Ada"},
				"token": {"accessToken": "access-1", "expiresAt": self.clock.now_ms() + 3_600_000}
			}),
		);
		self.session
			.login(&Credentials::new("ada@example.com", "secret"))
			.await
			.unwrap();
	}
}

#[derive(Default)]
struct Counts {
	success: AtomicUsize,
	error: AtomicUsize,
	settled: AtomicUsize,
}

fn counted(options: FetchOptions) -> (Arc<Counts>, FetchOptions) {
	let counts = Arc::new(Counts::default());
	let (s, e, t) = (Arc::clone(&counts), Arc::clone(&counts), Arc::clone(&counts));
	let options = options
		.on_success(move |_| {
			s.success.fetch_add(1, Ordering::SeqCst);
		})
		.on_error(move |_| {
			e.error.fetch_add(1, Ordering::SeqCst);
		})
		.on_settled(move |_| {
			t.settled.fetch_add(1, Ordering::SeqCst);
		});
	(counts, options)
}

fn snapshot(counts: &Counts) -> (usize, usize, usize) {
	(
		counts.success.load(Ordering::SeqCst),
		counts.error.load(Ordering::SeqCst),
		counts.settled.load(Ordering::SeqCst),
	)
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_exponentially_then_surface_the_error() {
	let h = Harness::new();
	h.mock.fail(Method::Get, "/flaky", TransportError::network("connection refused"));
	let (counts, options) = counted(FetchOptions::manual().with_retries(2, Duration::from_millis(100)));
	let coordinator = h.coordinator(RequestDescriptor::get("/flaky"), options);

	let start = tokio::time::Instant::now();
	let task = {
		let coordinator = Arc::clone(&coordinator);
		tokio::spawn(async move { coordinator.run().await })
	};

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(h.mock.calls_to("/flaky"), 1);
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(h.mock.calls_to("/flaky"), 2);
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(h.mock.calls_to("/flaky"), 2);

	let err = task.await.unwrap().unwrap_err();
	let elapsed = start.elapsed();
	assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(310));
	assert_eq!(h.mock.calls_to("/flaky"), 3);
	assert_eq!(err.kind(), ErrorKind::Network);
	assert_eq!(snapshot(&counts), (0, 1, 1));

	let state = coordinator.state();
	assert!(!state.loading);
	assert_eq!(state.error.map(|e| e.to_string()).as_deref(), Some("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn validation_failures_are_not_retried() {
	let h = Harness::new();
	h.mock.fail(
		Method::Post,
		"/posts",
		TransportError::http(422, "Unprocessable Entity", Some(r#"{"message":"title required"}"#.into())),
	);
	let coordinator = h.coordinator(
		RequestDescriptor::post("/posts").with_json(json!({})),
		FetchOptions::manual().with_retries(3, Duration::from_millis(10)),
	);

	let err = coordinator.run().await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Validation);
	assert_eq!(h.mock.calls_to("/posts"), 1);
	assert_eq!(coordinator.state().status, Some(422));
}

#[tokio::test(start_paused = true)]
async fn system_failures_retry_only_when_enabled() {
	let h = Harness::new();
	h.mock.fail(Method::Get, "/busy", TransportError::http(503, "Service Unavailable", None));

	let plain = h.coordinator(
		RequestDescriptor::get("/busy"),
		FetchOptions::manual().with_retries(1, Duration::from_millis(10)),
	);
	plain.run().await.unwrap_err();
	assert_eq!(h.mock.calls_to("/busy"), 1);

	let opted_in = h.coordinator(
		RequestDescriptor::get("/busy"),
		FetchOptions::manual()
			.with_retries(1, Duration::from_millis(10))
			.retry_system_errors(),
	);
	opted_in.run().await.unwrap_err();
	assert_eq!(h.mock.calls_to("/busy"), 3);
}

#[tokio::test(start_paused = true)]
async fn descriptor_retry_count_overrides_options() {
	let h = Harness::new();
	h.mock.fail(Method::Get, "/down", TransportError::network("down"));
	let coordinator = h.coordinator(
		RequestDescriptor::get("/down").with_retries(1),
		FetchOptions::manual().with_retries(5, Duration::from_millis(10)),
	);

	coordinator.run().await.unwrap_err();
	assert_eq!(h.mock.calls_to("/down"), 2);
}

#[tokio::test(start_paused = true)]
async fn identical_concurrent_runs_share_one_call() {
	let h = Harness::new();
	h.mock.respond_json(Method::Get, "/posts", json!([{"id": 1}]));
	h.mock.set_delay(Duration::from_millis(50));

	let a = h.coordinator(RequestDescriptor::get("/posts"), FetchOptions::manual());
	let b = h.coordinator(RequestDescriptor::get("/posts"), FetchOptions::manual());
	let c = h.coordinator(RequestDescriptor::get("/posts"), FetchOptions::manual());

	let (ra, rb, rc) = tokio::join!(a.run(), b.run(), c.run());
	assert_eq!(h.mock.calls_to("/posts"), 1);
	for result in [ra, rb, rc] {
		assert_eq!(result.unwrap(), Payload::Json(json!([{"id": 1}])));
	}
	assert!(h.pending.is_empty());
}

#[tokio::test(start_paused = true)]
async fn bodies_of_different_kinds_are_not_merged() {
	let h = Harness::new();
	h.mock.respond_json(Method::Post, "/search", json!({"hits": 1}));
	h.mock.set_delay(Duration::from_millis(50));

	let as_json = h.coordinator(
		RequestDescriptor::post("/search").with_body(Body::Json(json!({"q": 1}))),
		FetchOptions::manual(),
	);
	let as_text = h.coordinator(
		RequestDescriptor::post("/search").with_body(Body::Text(r#"{"q":1}"#.into())),
		FetchOptions::manual(),
	);

	let (a, b) = tokio::join!(as_json.run(), as_text.run());
	a.unwrap();
	b.unwrap();
	assert_eq!(h.mock.calls_to("/search"), 2);
}

#[tokio::test(start_paused = true)]
async fn cached_results_short_circuit_until_they_expire() {
	let h = Harness::new();
	h.mock.respond_json(Method::Get, "/posts", json!({"page": 1}));
	let (counts, options) = counted(
		FetchOptions::manual()
			.with_cache_key("posts:1")
			.with_cache_ttl(Duration::from_secs(60)),
	);
	let coordinator = h.coordinator(RequestDescriptor::get("/posts"), options);

	coordinator.run().await.unwrap();
	assert_eq!(coordinator.state().status, Some(200));
	assert_eq!(h.cache.get("posts:1"), Some(Payload::Json(json!({"page": 1}))));

	let hit = coordinator.run().await.unwrap();
	assert_eq!(hit, Payload::Json(json!({"page": 1})));
	assert_eq!(h.mock.calls_to("/posts"), 1);
	assert_eq!(coordinator.state().status, None);
	assert_eq!(snapshot(&counts), (2, 0, 2));

	tokio::time::advance(Duration::from_secs(61)).await;
	coordinator.run().await.unwrap();
	assert_eq!(h.mock.calls_to("/posts"), 2);
}

#[tokio::test(start_paused = true)]
async fn cache_policy_keys_by_signature() {
	let h = Harness::new();
	h.mock.respond_json(Method::Get, "/tags", json!(["rust"]));
	let descriptor = RequestDescriptor::get("/tags").with_cache_policy(CachePolicy::Cache);
	let signature = descriptor.signature().to_string();

	let coordinator = h.coordinator(descriptor, FetchOptions::manual());
	assert_eq!(coordinator.cache_key().as_deref(), Some(signature.as_str()));
	coordinator.run().await.unwrap();
	coordinator.run().await.unwrap();
	assert_eq!(h.mock.calls_to("/tags"), 1);

	let no_store = h.coordinator(
		RequestDescriptor::get("/tags").with_cache_policy(CachePolicy::NoStore),
		FetchOptions::manual().with_cache_key("tags"),
	);
	assert_eq!(no_store.cache_key(), None);
}

#[tokio::test(start_paused = true)]
async fn writes_are_never_cached() {
	let h = Harness::new();
	h.mock.respond_json(Method::Post, "/posts", json!({"id": 7}));
	let coordinator = h.coordinator(
		RequestDescriptor::post("/posts").with_json(json!({"title": "x"})),
		FetchOptions::manual().with_cache_key("posts"),
	);

	assert_eq!(coordinator.cache_key(), None);
	coordinator.run().await.unwrap();
	coordinator.run().await.unwrap();
	assert_eq!(h.mock.calls_to("/posts"), 2);
	assert!(h.cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn mutate_updates_state_and_cache_without_a_request() {
	let h = Harness::new();
	let coordinator = h.coordinator(
		RequestDescriptor::get("/profile"),
		FetchOptions::manual().with_cache_key("profile"),
	);

	coordinator.mutate(Payload::Json(json!({"name": "Ada"})));

	assert_eq!(coordinator.state().data, Some(Payload::Json(json!({"name": "Ada"}))));
	assert_eq!(h.cache.get("profile"), Some(Payload::Json(json!({"name": "Ada"}))));
	assert!(h.mock.calls().is_empty());

	let served = coordinator.run().await.unwrap();
	assert_eq!(served, Payload::Json(json!({"name": "Ada"})));
	assert!(h.mock.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auth_gate_declines_without_a_session() {
	let h = Harness::new();
	let (counts, options) = counted(FetchOptions::manual().auth_required());
	let coordinator = h.coordinator(RequestDescriptor::get("/private"), options);

	let err = coordinator.run().await.unwrap_err();
	assert!(matches!(err, Error::NotAuthenticated(_)));
	assert!(h.mock.calls().is_empty());
	assert_eq!(snapshot(&counts), (0, 1, 1));
}

#[tokio::test(start_paused = true)]
async fn wait_for_auth_defers_until_login() {
	let h = Harness::new();
	h.mock.respond_json(Method::Get, "/private", json!({"secret": true}));
	let coordinator = h.coordinator(RequestDescriptor::get("/private"), FetchOptions::manual().wait_for_auth());

	let task = {
		let coordinator = Arc::clone(&coordinator);
		tokio::spawn(async move { coordinator.run().await })
	};
	tokio::time::sleep(Duration::from_secs(5)).await;
	assert_eq!(h.mock.calls_to("/private"), 0);
	assert!(coordinator.state().loading);

	h.login().await;
	let data = task.await.unwrap().unwrap();
	assert_eq!(data, Payload::Json(json!({"secret": true})));

	let sent = h.mock.calls().into_iter().find(|d| d.path() == "/private").unwrap();
	assert_eq!(sent.headers().get("authorization"), Some("Bearer access-1"));
}

#[tokio::test(start_paused = true)]
async fn unauthorized_response_ends_the_session() {
	let h = Harness::new();
	h.login().await;
	h.mock.fail(Method::Get, "/private", TransportError::http(401, "Unauthorized", None));
	let coordinator = h.coordinator(RequestDescriptor::get("/private"), FetchOptions::manual().auth_required());

	let err = coordinator.run().await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Authentication);
	assert!(!h.session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn unauthorized_public_response_keeps_the_session() {
	let h = Harness::new();
	h.login().await;
	h.mock.fail(
		Method::Get,
		"https://partner.example.com/feed",
		TransportError::http(401, "Unauthorized", None),
	);
	let coordinator = h.coordinator(
		RequestDescriptor::get("https://partner.example.com/feed"),
		FetchOptions::manual(),
	);

	let err = coordinator.run().await.unwrap_err();

	assert_eq!(err.kind(), ErrorKind::Authentication);
	assert_eq!(coordinator.state().status, Some(401));
	assert!(h.session.is_authenticated());
	let sent = h.mock.calls().into_iter().find(|d| d.path().starts_with("https://")).unwrap();
	assert!(sent.headers().get("authorization").is_none());
}

#[tokio::test(start_paused = true)]
async fn later_run_supersedes_earlier_one() {
	let h = Harness::new();
	h.mock.respond_json(Method::Get, "/feed", json!("fresh"));
	h.mock.set_delay(Duration::from_millis(100));
	let (counts, options) = counted(FetchOptions::manual());
	let coordinator = h.coordinator(RequestDescriptor::get("/feed"), options);

	let first = {
		let coordinator = Arc::clone(&coordinator);
		tokio::spawn(async move { coordinator.run().await })
	};
	tokio::time::sleep(Duration::from_millis(10)).await;
	let second = coordinator.run().await.unwrap();

	assert!(first.await.unwrap().unwrap_err().is_cancelled());
	assert_eq!(second, Payload::Json(json!("fresh")));
	assert_eq!(snapshot(&counts), (1, 0, 1));
	assert_eq!(coordinator.state().data, Some(Payload::Json(json!("fresh"))));
}

#[tokio::test(start_paused = true)]
async fn cancel_leaves_state_and_cache_untouched() {
	let h = Harness::new();
	h.mock.respond_json(Method::Get, "/slow", json!(1));
	h.mock.set_delay(Duration::from_secs(1));
	let (counts, options) = counted(FetchOptions::manual().with_cache_key("slow"));
	let coordinator = h.coordinator(RequestDescriptor::get("/slow"), options);

	let task = {
		let coordinator = Arc::clone(&coordinator);
		tokio::spawn(async move { coordinator.run().await })
	};
	tokio::time::sleep(Duration::from_millis(100)).await;
	coordinator.cancel();

	assert!(task.await.unwrap().unwrap_err().is_cancelled());
	tokio::time::sleep(Duration::from_secs(2)).await;

	let state = coordinator.state();
	assert!(!state.loading);
	assert!(state.data.is_none() && state.error.is_none());
	assert!(h.cache.is_empty());
	assert!(h.pending.is_empty());
	assert_eq!(snapshot(&counts), (0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_retry_backoff() {
	let h = Harness::new();
	h.mock.fail(Method::Get, "/flaky", TransportError::network("refused"));
	let coordinator = h.coordinator(
		RequestDescriptor::get("/flaky"),
		FetchOptions::manual().with_retries(3, Duration::from_secs(10)),
	);

	let task = {
		let coordinator = Arc::clone(&coordinator);
		tokio::spawn(async move { coordinator.run().await })
	};
	tokio::time::sleep(Duration::from_secs(1)).await;
	coordinator.cancel();

	assert!(task.await.unwrap().unwrap_err().is_cancelled());
	tokio::time::sleep(Duration::from_secs(60)).await;
	assert_eq!(h.mock.calls_to("/flaky"), 1);
}

#[tokio::test(start_paused = true)]
async fn mount_respects_immediate_manual_and_enabled() {
	let h = Harness::new();
	h.mock.respond_json(Method::Get, "/items", json!([]));

	let auto = h.coordinator(RequestDescriptor::get("/items"), FetchOptions::new());
	auto.mount().unwrap().await.unwrap().unwrap();
	assert_eq!(h.mock.calls_to("/items"), 1);

	let manual = h.coordinator(RequestDescriptor::get("/items"), FetchOptions::manual());
	assert!(manual.mount().is_none());
	assert!(manual.set_enabled(false).is_none());
	assert!(manual.set_enabled(true).is_none());

	let disabled = h.coordinator(RequestDescriptor::get("/items"), FetchOptions::new().enabled(false));
	assert!(disabled.mount().is_none());
	disabled.set_enabled(true).unwrap().await.unwrap().unwrap();
	assert_eq!(h.mock.calls_to("/items"), 2);
}

#[tokio::test(start_paused = true)]
async fn reset_returns_to_initial_state() {
	let h = Harness::new();
	h.mock.respond_json(Method::Get, "/items", json!([1]));
	let coordinator = h.coordinator(RequestDescriptor::get("/items"), FetchOptions::manual());

	coordinator.run().await.unwrap();
	assert!(coordinator.state().data.is_some());

	coordinator.reset();
	let state = coordinator.state();
	assert!(state.data.is_none() && state.error.is_none() && state.status.is_none());
	assert!(!state.loading);
}
