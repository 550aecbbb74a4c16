//! Persistent key-value storage port.
//!
//! The session manager persists its token, user, offline queue and refresh
//! lease through [`StoragePort`]. Implementations that are shared between
//! several processes or contexts report writes made elsewhere through
//! [`StoragePort::on_external_change`]; a context never hears about its own
//! writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::handlers::{HandlerMap, Subscription, dispatch_filtered, register};

/// A key written or removed by another context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
	pub key: String,
	/// `None` when the key was removed.
	pub new_value: Option<String>,
}

/// Callback for [`StorageChange`]s.
pub type StorageListener = Arc<dyn Fn(&StorageChange) + Send + Sync>;

/// String key-value store with change notification.
pub trait StoragePort: Send + Sync {
	fn read(&self, key: &str) -> Result<Option<String>>;

	fn write(&self, key: &str, value: &str) -> Result<()>;

	fn remove(&self, key: &str) -> Result<()>;

	/// Registers `listener` for changes made by other contexts.
	///
	/// Ports without a notion of other contexts return an inert subscription.
	fn on_external_change(&self, listener: StorageListener) -> Subscription;
}

/// Reads and decodes a JSON value.
///
/// A value that fails to decode reads as absent; the caller treats it like a
/// missing key rather than failing the whole restore.
pub fn read_json<T: DeserializeOwned>(storage: &dyn StoragePort, key: &str) -> Result<Option<T>> {
	let Some(raw) = storage.read(key)? else {
		return Ok(None);
	};
	match serde_json::from_str(&raw) {
		Ok(value) => Ok(Some(value)),
		Err(err) => {
			tracing::warn!(key, error = %err, "discarding undecodable stored value");
			Ok(None)
		}
	}
}

/// Encodes `value` as JSON and writes it.
pub fn write_json<T: Serialize + ?Sized>(storage: &dyn StoragePort, key: &str, value: &T) -> Result<()> {
	let raw = serde_json::to_string(value)?;
	storage.write(key, &raw)
}

#[derive(Default)]
struct MemoryBackend {
	values: Mutex<HashMap<String, String>>,
	next_context: AtomicU64,
	listeners: HandlerMap<StorageChange, u64>,
}

/// In-memory storage. Contexts opened from the same store share values and
/// see each other's writes as external changes.
#[derive(Clone)]
pub struct MemoryStorage {
	backend: Arc<MemoryBackend>,
	context: u64,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::from_backend(Arc::new(MemoryBackend::default()))
	}

	fn from_backend(backend: Arc<MemoryBackend>) -> Self {
		let context = backend.next_context.fetch_add(1, Ordering::SeqCst);
		Self { backend, context }
	}

	/// Opens another context over the same values.
	pub fn open_context(&self) -> Self {
		Self::from_backend(Arc::clone(&self.backend))
	}

	pub fn context_id(&self) -> u64 {
		self.context
	}

	fn notify(&self, key: &str, new_value: Option<String>) {
		let change = StorageChange {
			key: key.to_string(),
			new_value,
		};
		let origin = self.context;
		dispatch_filtered(&self.backend.listeners, &change, |context| *context != origin);
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for MemoryStorage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryStorage")
			.field("context", &self.context)
			.field("keys", &self.backend.values.lock().len())
			.finish()
	}
}

impl StoragePort for MemoryStorage {
	fn read(&self, key: &str) -> Result<Option<String>> {
		Ok(self.backend.values.lock().get(key).cloned())
	}

	fn write(&self, key: &str, value: &str) -> Result<()> {
		self.backend
			.values
			.lock()
			.insert(key.to_string(), value.to_string());
		self.notify(key, Some(value.to_string()));
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		let existed = self.backend.values.lock().remove(key).is_some();
		if existed {
			self.notify(key, None);
		}
		Ok(())
	}

	fn on_external_change(&self, listener: StorageListener) -> Subscription {
		register(&self.backend.listeners, self.context, move |change: &StorageChange| {
			listener(change)
		})
	}
}

/// Storage that refuses every operation. Useful for exercising failure paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl StoragePort for UnavailableStorage {
	fn read(&self, _key: &str) -> Result<Option<String>> {
		Err(Error::Storage("storage unavailable".into()))
	}

	fn write(&self, _key: &str, _value: &str) -> Result<()> {
		Err(Error::Storage("storage unavailable".into()))
	}

	fn remove(&self, _key: &str) -> Result<()> {
		Err(Error::Storage("storage unavailable".into()))
	}

	fn on_external_change(&self, _listener: StorageListener) -> Subscription {
		Subscription::inert()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn contexts_share_values() {
		let tab_a = MemoryStorage::new();
		let tab_b = tab_a.open_context();

		tab_a.write("token", "abc").unwrap();
		assert_eq!(tab_b.read("token").unwrap().as_deref(), Some("abc"));

		tab_b.remove("token").unwrap();
		assert_eq!(tab_a.read("token").unwrap(), None);
	}

	#[test]
	fn only_other_contexts_are_notified() {
		let tab_a = MemoryStorage::new();
		let tab_b = tab_a.open_context();
		let seen_a = Arc::new(Mutex::new(Vec::new()));
		let seen_b = Arc::new(Mutex::new(Vec::new()));

		let sink = Arc::clone(&seen_a);
		let _sub_a = tab_a.on_external_change(Arc::new(move |c: &StorageChange| sink.lock().push(c.clone())));
		let sink = Arc::clone(&seen_b);
		let _sub_b = tab_b.on_external_change(Arc::new(move |c: &StorageChange| sink.lock().push(c.clone())));

		tab_a.write("user", "{}").unwrap();
		tab_a.remove("user").unwrap();

		assert!(seen_a.lock().is_empty());
		assert_eq!(
			*seen_b.lock(),
			vec![
				StorageChange {
					key: "user".into(),
					new_value: Some("{}".into()),
				},
				StorageChange {
					key: "user".into(),
					new_value: None,
				},
			]
		);
	}

	#[test]
	fn removing_missing_key_is_silent() {
		let tab_a = MemoryStorage::new();
		let tab_b = tab_a.open_context();
		let hits = Arc::new(AtomicU64::new(0));

		let counter = Arc::clone(&hits);
		let _sub = tab_b.on_external_change(Arc::new(move |_: &StorageChange| {
			counter.fetch_add(1, Ordering::SeqCst);
		}));

		tab_a.remove("nothing").unwrap();
		assert_eq!(hits.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn dropped_subscription_stops_notifications() {
		let tab_a = MemoryStorage::new();
		let tab_b = tab_a.open_context();
		let hits = Arc::new(AtomicU64::new(0));

		let counter = Arc::clone(&hits);
		let sub = tab_b.on_external_change(Arc::new(move |_: &StorageChange| {
			counter.fetch_add(1, Ordering::SeqCst);
		}));
		tab_a.write("k", "1").unwrap();
		drop(sub);
		tab_a.write("k", "2").unwrap();

		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn json_helpers_treat_garbage_as_absent() {
		let storage = MemoryStorage::new();
		write_json(&storage, "queue", &json!([1, 2, 3])).unwrap();
		let queue: Option<Vec<u32>> = read_json(&storage, "queue").unwrap();
		assert_eq!(queue, Some(vec![1, 2, 3]));

		storage.write("queue", "not json").unwrap();
		let queue: Option<Vec<u32>> = read_json(&storage, "queue").unwrap();
		assert_eq!(queue, None);
	}

	#[test]
	fn unavailable_storage_reports_errors() {
		let storage = UnavailableStorage;
		assert!(matches!(storage.read("k"), Err(Error::Storage(_))));
		assert!(write_json(&storage, "k", &1).is_err());
	}
}
