//! Cross-context refresh lease.
//!
//! Contexts sharing one storage backend agree on a single refresher per
//! token through a lease record. The storage port has no compare-and-swap,
//! so the lease narrows the window for duplicate refreshes rather than
//! closing it; the in-process refresh lock covers callers within a context.

use std::time::Duration;

use fk_runtime::{Result, StoragePort, read_json, write_json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshLease {
	/// Fingerprint of the token being refreshed.
	pub token_id: String,
	pub holder: String,
	/// Unix epoch milliseconds.
	pub expires_at: i64,
}

impl RefreshLease {
	fn is_live(&self, now_ms: i64) -> bool {
		self.expires_at > now_ms
	}
}

/// Takes the lease for `token_id` unless another holder has a live one.
///
/// Returns false when the refresh belongs to someone else.
pub(crate) fn try_acquire(
	storage: &dyn StoragePort,
	key: &str,
	token_id: &str,
	holder: &str,
	now_ms: i64,
	ttl: Duration,
) -> Result<bool> {
	let held_elsewhere = read_json::<RefreshLease>(storage, key)?.is_some_and(|current| {
		current.token_id == token_id && current.holder != holder && current.is_live(now_ms)
	});
	if held_elsewhere {
		return Ok(false);
	}

	let lease = RefreshLease {
		token_id: token_id.to_string(),
		holder: holder.to_string(),
		expires_at: now_ms + ttl.as_millis() as i64,
	};
	write_json(storage, key, &lease)?;
	Ok(true)
}

/// Drops the lease if `holder` still owns it.
pub(crate) fn release(storage: &dyn StoragePort, key: &str, holder: &str) -> Result<()> {
	match read_json::<RefreshLease>(storage, key)? {
		Some(current) if current.holder == holder => storage.remove(key),
		_ => Ok(()),
	}
}
