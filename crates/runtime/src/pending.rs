//! Pending-request registry.
//!
//! Collapses concurrent requests with the same [`RequestSignature`] onto one
//! in-flight call. The first caller starts the call; later callers join the
//! same [`Shared`] future and observe its single outcome.
//!
//! The registry holds only a [`WeakShared`]: once every caller has dropped
//! its handle the call is aborted and the entry reads as absent. A completed
//! call removes its own entry before any caller sees the result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fk_protocol::{RequestSignature, ResponseEnvelope};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared, WeakShared};
use parking_lot::Mutex;

use crate::error::Result;

/// Boxed in-flight call.
pub type CallFuture = BoxFuture<'static, Result<ResponseEnvelope>>;

/// Cloneable handle to an in-flight call.
pub type SharedCall = Shared<CallFuture>;

struct PendingEntry {
	id: u64,
	call: WeakShared<CallFuture>,
}

/// Handle returned by [`PendingRegistry::join_or_start`].
pub struct PendingCall {
	pub call: SharedCall,
	/// True if this caller joined a call started by someone else.
	pub joined: bool,
}

/// Map from request signature to in-flight call.
#[derive(Default)]
pub struct PendingRegistry {
	entries: Mutex<HashMap<RequestSignature, PendingEntry>>,
	next_id: AtomicU64,
}

impl PendingRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Joins the live call for `signature`, or starts one with `start`.
	///
	/// `start` runs only when no live call exists, with the registry lock
	/// held, so two callers can never both start the same signature.
	pub fn join_or_start<F>(self: &Arc<Self>, signature: &RequestSignature, start: F) -> PendingCall
	where
		F: FnOnce() -> CallFuture,
	{
		let mut entries = self.entries.lock();

		if let Some(call) = entries.get(signature).and_then(|entry| entry.call.upgrade()) {
			tracing::debug!(%signature, "joining in-flight request");
			return PendingCall { call, joined: true };
		}

		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let registry: Weak<Self> = Arc::downgrade(self);
		let key = signature.clone();
		let inner = start();

		let call = async move {
			let result = inner.await;
			if let Some(registry) = registry.upgrade() {
				registry.complete(&key, id);
			}
			result
		}
		.boxed()
		.shared();

		match call.downgrade() {
			Some(weak) => {
				entries.insert(signature.clone(), PendingEntry { id, call: weak });
			}
			None => tracing::warn!(%signature, "call completed before registration"),
		}

		PendingCall { call, joined: false }
	}

	/// Returns true if a live call exists for `signature`.
	pub fn contains(&self, signature: &RequestSignature) -> bool {
		let mut entries = self.entries.lock();
		let live = entries
			.get(signature)
			.is_some_and(|entry| entry.call.upgrade().is_some());
		if !live {
			entries.remove(signature);
		}
		live
	}

	/// Number of live calls. Purges entries whose callers are all gone.
	pub fn len(&self) -> usize {
		let mut entries = self.entries.lock();
		entries.retain(|_, entry| entry.call.upgrade().is_some());
		entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn complete(&self, signature: &RequestSignature, id: u64) {
		let mut entries = self.entries.lock();
		if entries.get(signature).is_some_and(|entry| entry.id == id) {
			entries.remove(signature);
		}
	}
}

impl std::fmt::Debug for PendingRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PendingRegistry")
			.field("entries", &self.entries.lock().len())
			.finish()
	}
}
