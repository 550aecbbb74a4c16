//! Offline action replay.

use std::future::Future;
use std::pin::Pin;

use fk_protocol::OfflineAction;
use fk_runtime::{CancelSignal, Error, Result, SharedTransport};

/// Boxed future returned by [`OfflineReplayer::replay`].
pub type ReplayFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Performs a queued offline action once the network is back.
pub trait OfflineReplayer: Send + Sync {
	fn replay<'a>(&'a self, action: &'a OfflineAction) -> ReplayFuture<'a>;
}

/// Replays `request` actions through a transport.
///
/// Any other kind fails and stays queued.
pub struct TransportReplayer {
	transport: SharedTransport,
}

impl TransportReplayer {
	pub fn new(transport: SharedTransport) -> Self {
		Self { transport }
	}
}

impl OfflineReplayer for TransportReplayer {
	fn replay<'a>(&'a self, action: &'a OfflineAction) -> ReplayFuture<'a> {
		Box::pin(async move {
			let descriptor = action.request().ok_or_else(|| {
				Error::InvalidRequest(format!("cannot replay offline action {} of kind {}", action.id, action.kind))
			})?;
			tracing::debug!(id = action.id, path = descriptor.path(), "replaying offline request");
			self.transport.execute(descriptor, CancelSignal::never()).await?;
			Ok(())
		})
	}
}

/// Summary of one [`sync_offline_actions`](super::SessionManager::sync_offline_actions) pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
	/// Ids replayed successfully, in replay order.
	pub replayed: Vec<u64>,
	/// Ids that failed and remain queued.
	pub failed: Vec<u64>,
}

impl SyncReport {
	pub fn is_empty(&self) -> bool {
		self.replayed.is_empty() && self.failed.is_empty()
	}
}
