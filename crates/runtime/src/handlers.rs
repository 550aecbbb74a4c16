//! Listener registries.
//!
//! A [`HandlerMap`] keeps callbacks in an [`IndexMap`] keyed by id, so they
//! fire in registration order and unregister without a scan. Storage-change
//! listeners and the session's notification channels use it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for registered callbacks.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Callback invoked with a borrowed event.
pub type HandlerFn<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registered callback with optional metadata `M`.
pub struct HandlerEntry<E, M = ()> {
	pub id: HandlerId,
	pub meta: M,
	pub handler: HandlerFn<E>,
}

/// Handler storage: [`IndexMap`] for O(1) removal with stable insertion order.
pub type HandlerMap<E, M = ()> = Arc<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>>;

/// Creates an empty handler map.
pub fn handler_map<E, M>() -> HandlerMap<E, M> {
	Arc::new(Mutex::new(IndexMap::new()))
}

/// Registers `handler` in `map` and returns its [`Subscription`].
pub fn register<E, M, F>(map: &HandlerMap<E, M>, meta: M, handler: F) -> Subscription
where
	E: Send + Sync + 'static,
	M: Send + Sync + 'static,
	F: Fn(&E) + Send + Sync + 'static,
{
	let id = next_handler_id();
	map.lock().insert(
		id,
		HandlerEntry {
			id,
			meta,
			handler: Arc::new(handler),
		},
	);
	Subscription::for_map(id, map)
}

/// Invokes every handler whose metadata passes `filter`, in registration order.
///
/// Handlers are snapshotted first and called with the lock released, so a
/// handler may register or drop subscriptions on the same map.
pub fn dispatch_filtered<E, M>(map: &HandlerMap<E, M>, event: &E, filter: impl Fn(&M) -> bool) {
	let handlers: Vec<HandlerFn<E>> = {
		let map = map.lock();
		map.values()
			.filter(|entry| filter(&entry.meta))
			.map(|entry| Arc::clone(&entry.handler))
			.collect()
	};

	for handler in handlers {
		handler(event);
	}
}

/// Invokes every handler in registration order.
pub fn dispatch<E, M>(map: &HandlerMap<E, M>, event: &E) {
	dispatch_filtered(map, event, |_| true);
}

/// Keeps a callback registered until dropped.
///
/// The release closure only holds a weak reference to its map, so a
/// subscription may outlive the component that issued it.
pub struct Subscription {
	id: HandlerId,
	release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
	pub fn new(id: HandlerId, release: impl FnOnce() + Send + Sync + 'static) -> Self {
		Self {
			id,
			release: Some(Box::new(release)),
		}
	}

	/// A subscription with nothing to release, for sources that never emit.
	pub fn inert() -> Self {
		Self { id: 0, release: None }
	}

	fn for_map<E, M>(id: HandlerId, map: &HandlerMap<E, M>) -> Self
	where
		E: Send + Sync + 'static,
		M: Send + Sync + 'static,
	{
		let map = Arc::downgrade(map);
		Self::new(id, move || {
			if let Some(map) = map.upgrade() {
				map.lock().shift_remove(&id);
			}
		})
	}

	pub fn id(&self) -> HandlerId {
		self.id
	}

	pub fn is_active(&self) -> bool {
		self.release.is_some()
	}

	pub fn unsubscribe(self) {
		drop(self);
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.is_active())
			.finish()
	}
}
