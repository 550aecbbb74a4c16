use fetchkit::Client;

use crate::cli::RequestArgs;
use crate::error::Result;
use crate::output::{QueueData, SyncData};

/// Stores the request in the persisted offline queue without sending it.
pub fn queue(client: &Client, args: &RequestArgs) -> Result<QueueData> {
	let session = client.session();
	let action = session.queue_request(&args.descriptor()?)?;
	Ok(QueueData {
		action,
		queued: session.offline_actions().len(),
	})
}

/// Replays the queue in order; failed actions stay queued.
pub async fn sync(client: &Client) -> SyncData {
	let session = client.session();
	let report = session.sync_offline_actions().await;
	if !report.failed.is_empty() {
		tracing::warn!(failed = report.failed.len(), "some offline actions failed to replay");
	}
	SyncData {
		replayed: report.replayed,
		failed: report.failed,
		remaining: session.offline_actions().len(),
	}
}
