//! Time-to-live result cache.
//!
//! Entries expire lazily: `get` treats an entry older than its ttl as absent
//! and evicts it. There is no background sweeper.

use std::collections::HashMap;
use std::time::Duration;

use fk_protocol::Payload;
use parking_lot::Mutex;

use crate::clock::SharedClock;

/// Default lifetime of a cached result.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Cached value with the time it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
	pub value: V,
	/// Unix epoch milliseconds.
	pub stored_at: i64,
	pub ttl_ms: u64,
}

impl<V> CacheEntry<V> {
	/// An entry is expired once its age exceeds its ttl.
	pub fn is_expired(&self, now_ms: i64) -> bool {
		now_ms.saturating_sub(self.stored_at) > self.ttl_ms as i64
	}
}

/// Keyed TTL store shared by all coordinators of a client.
#[derive(Debug)]
pub struct ResultCache<V = Payload> {
	entries: Mutex<HashMap<String, CacheEntry<V>>>,
	clock: SharedClock,
	default_ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
	pub fn new(clock: SharedClock) -> Self {
		Self::with_default_ttl(clock, DEFAULT_TTL)
	}

	pub fn with_default_ttl(clock: SharedClock, default_ttl: Duration) -> Self {
		Self {
			entries: Mutex::new(HashMap::new()),
			clock,
			default_ttl,
		}
	}

	pub fn default_ttl(&self) -> Duration {
		self.default_ttl
	}

	/// Returns the live value for `key`, evicting it if expired.
	pub fn get(&self, key: &str) -> Option<V> {
		let now = self.clock.now_ms();
		let mut entries = self.entries.lock();
		match entries.get(key) {
			Some(entry) if entry.is_expired(now) => {
				entries.remove(key);
				tracing::debug!(key, "cache entry expired");
				None
			}
			Some(entry) => Some(entry.value.clone()),
			None => None,
		}
	}

	/// Stores `value` under `key`; `ttl` falls back to the cache default.
	pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
		let ttl = ttl.unwrap_or(self.default_ttl);
		let entry = CacheEntry {
			value,
			stored_at: self.clock.now_ms(),
			ttl_ms: ttl.as_millis() as u64,
		};
		self.entries.lock().insert(key.into(), entry);
	}

	/// Removes `key`. Returns true if an entry existed.
	pub fn invalidate(&self, key: &str) -> bool {
		self.entries.lock().remove(key).is_some()
	}

	/// Removes every key starting with `prefix`; returns how many were removed.
	pub fn invalidate_prefix(&self, prefix: &str) -> usize {
		let mut entries = self.entries.lock();
		let before = entries.len();
		entries.retain(|key, _| !key.starts_with(prefix));
		before - entries.len()
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Number of stored entries, including expired ones not yet read.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::json;

	use super::*;
	use crate::clock::ManualClock;

	fn cache() -> (Arc<ManualClock>, ResultCache) {
		let clock = Arc::new(ManualClock::new(10_000));
		let cache = ResultCache::new(clock.clone());
		(clock, cache)
	}

	#[test]
	fn entry_is_live_until_ttl_is_exceeded() {
		let (clock, cache) = cache();
		cache.set("posts", Payload::Json(json!([1, 2])), Some(Duration::from_millis(500)));

		clock.advance(Duration::from_millis(500));
		assert_eq!(cache.get("posts"), Some(Payload::Json(json!([1, 2]))));

		clock.advance(Duration::from_millis(1));
		assert_eq!(cache.get("posts"), None);
	}

	#[test]
	fn expired_read_evicts_entry() {
		let (clock, cache) = cache();
		cache.set("a", Payload::Text("x".into()), Some(Duration::from_millis(10)));
		clock.advance(Duration::from_secs(1));

		assert_eq!(cache.len(), 1);
		assert_eq!(cache.get("a"), None);
		assert!(cache.is_empty());
	}

	#[test]
	fn default_ttl_applies_when_none_given() {
		let (clock, cache) = cache();
		cache.set("a", Payload::Empty, None);

		clock.advance(DEFAULT_TTL);
		assert!(cache.get("a").is_some());
		clock.advance(Duration::from_millis(1));
		assert!(cache.get("a").is_none());
	}

	#[test]
	fn set_replaces_and_restarts_ttl() {
		let (clock, cache) = cache();
		cache.set("a", Payload::Text("old".into()), Some(Duration::from_millis(100)));
		clock.advance(Duration::from_millis(80));
		cache.set("a", Payload::Text("new".into()), Some(Duration::from_millis(100)));
		clock.advance(Duration::from_millis(80));

		assert_eq!(cache.get("a"), Some(Payload::Text("new".into())));
	}

	#[test]
	fn invalidate_and_clear() {
		let (_clock, cache) = cache();
		cache.set("user:1", Payload::Empty, None);
		cache.set("user:2", Payload::Empty, None);
		cache.set("posts", Payload::Empty, None);

		assert!(cache.invalidate("posts"));
		assert!(!cache.invalidate("posts"));
		assert_eq!(cache.invalidate_prefix("user:"), 2);
		assert!(cache.is_empty());

		cache.set("x", Payload::Empty, None);
		cache.clear();
		assert!(cache.get("x").is_none());
	}
}
