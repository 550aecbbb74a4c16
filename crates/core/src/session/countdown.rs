//! Session countdown task.
//!
//! One task per authenticated session ticks at the configured period and
//! hands each tick to [`SessionManager::tick`]. The task holds only a weak
//! reference, so it ends on its own once the manager is dropped.

use std::sync::Weak;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::SessionManager;

pub(super) async fn run(session: Weak<SessionManager>, period: Duration) {
	let mut interval = tokio::time::interval(period);
	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		interval.tick().await;
		let Some(session) = session.upgrade() else {
			break;
		};
		if !session.tick() {
			break;
		}
	}
	tracing::debug!("session countdown stopped");
}
