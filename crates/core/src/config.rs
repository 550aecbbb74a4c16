//! Client configuration.
//!
//! Every field has a default, so a partial `config.json` deserializes into a
//! complete [`ClientConfig`].

use std::time::Duration;

use fk_protocol::Headers;
use fk_runtime::TransportConfig;
use fk_runtime::transport::DEFAULT_SAME_ORIGIN_PREFIX;
use serde::{Deserialize, Serialize};

/// Default prefix for persisted session keys.
pub const DEFAULT_STORAGE_PREFIX: &str = "fetchkit.";

/// Top-level configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	/// Base locator relative paths are appended to.
	pub base_url: String,
	/// Origin same-origin API paths are joined to.
	pub origin: Option<String>,
	pub same_origin_prefix: String,
	pub default_headers: Headers,
	pub default_timeout_ms: u64,
	/// Lifetime of cached results when the caller gives none.
	pub cache_ttl_ms: u64,
	pub storage_prefix: String,
	pub session: SessionConfig,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: "http://localhost:3000".to_string(),
			origin: None,
			same_origin_prefix: DEFAULT_SAME_ORIGIN_PREFIX.to_string(),
			default_headers: Headers::new(),
			default_timeout_ms: fk_runtime::DEFAULT_TIMEOUT.as_millis() as u64,
			cache_ttl_ms: fk_runtime::DEFAULT_TTL.as_millis() as u64,
			storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
			session: SessionConfig::default(),
		}
	}
}

impl ClientConfig {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			..Self::default()
		}
	}

	pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
		self.origin = Some(origin.into());
		self
	}

	pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.insert(name, value);
		self
	}

	pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
		self.default_timeout_ms = timeout.as_millis() as u64;
		self
	}

	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl_ms = ttl.as_millis() as u64;
		self
	}

	pub fn with_storage_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.storage_prefix = prefix.into();
		self
	}

	pub fn with_session(mut self, session: SessionConfig) -> Self {
		self.session = session;
		self
	}

	pub fn default_timeout(&self) -> Duration {
		Duration::from_millis(self.default_timeout_ms)
	}

	pub fn cache_ttl(&self) -> Duration {
		Duration::from_millis(self.cache_ttl_ms)
	}

	pub fn transport_config(&self) -> TransportConfig {
		let mut config = TransportConfig::new(self.base_url.clone())
			.with_same_origin_prefix(self.same_origin_prefix.clone())
			.with_default_timeout(self.default_timeout());
		config.origin = self.origin.clone();
		config.default_headers = self.default_headers.clone();
		config
	}
}

/// Session timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	/// Remaining time at which the expiry warning fires.
	pub warning_threshold_ms: u64,
	/// Remaining time at which one automatic refresh is attempted.
	pub auto_refresh_threshold_ms: u64,
	/// Countdown period.
	pub tick_ms: u64,
	/// How long a cross-context refresh lease stays valid.
	pub refresh_lease_ms: u64,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			warning_threshold_ms: 5 * 60 * 1000,
			auto_refresh_threshold_ms: 10 * 60 * 1000,
			tick_ms: 1000,
			refresh_lease_ms: 30 * 1000,
		}
	}
}

impl SessionConfig {
	pub fn with_warning_threshold(mut self, threshold: Duration) -> Self {
		self.warning_threshold_ms = threshold.as_millis() as u64;
		self
	}

	pub fn with_auto_refresh_threshold(mut self, threshold: Duration) -> Self {
		self.auto_refresh_threshold_ms = threshold.as_millis() as u64;
		self
	}

	pub fn with_tick(mut self, tick: Duration) -> Self {
		self.tick_ms = tick.as_millis() as u64;
		self
	}

	pub fn tick(&self) -> Duration {
		Duration::from_millis(self.tick_ms.max(1))
	}

	pub fn refresh_lease(&self) -> Duration {
		Duration::from_millis(self.refresh_lease_ms)
	}
}
