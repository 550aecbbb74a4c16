//! Cooperative cancellation.
//!
//! A [`CancelHandle`] owns the right to cancel; any number of
//! [`CancelSignal`]s observe it. Dropping the handle without cancelling leaves
//! its signals pending forever, so a finished owner never looks cancelled.

use tokio::sync::watch;

/// Why a call was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
	/// The caller released the call.
	Caller,
	/// The per-call deadline elapsed.
	Timeout,
}

/// Owner side of a cancellation token.
#[derive(Debug)]
pub struct CancelHandle {
	tx: watch::Sender<Option<CancelReason>>,
}

/// Observer side of a cancellation token.
#[derive(Debug, Clone)]
pub struct CancelSignal {
	rx: watch::Receiver<Option<CancelReason>>,
}

impl CancelHandle {
	pub fn new() -> Self {
		let (tx, _) = watch::channel(None);
		Self { tx }
	}

	pub fn signal(&self) -> CancelSignal {
		CancelSignal {
			rx: self.tx.subscribe(),
		}
	}

	/// Cancels with [`CancelReason::Caller`].
	pub fn cancel(&self) {
		self.cancel_with(CancelReason::Caller);
	}

	/// Cancels with `reason`. The first reason wins.
	pub fn cancel_with(&self, reason: CancelReason) {
		self.tx.send_if_modified(|current| {
			if current.is_some() {
				return false;
			}
			*current = Some(reason);
			true
		});
	}

	pub fn is_cancelled(&self) -> bool {
		self.tx.borrow().is_some()
	}
}

impl Default for CancelHandle {
	fn default() -> Self {
		Self::new()
	}
}

impl CancelSignal {
	/// A signal that never fires.
	pub fn never() -> Self {
		let (_tx, rx) = watch::channel(None);
		Self { rx }
	}

	pub fn reason(&self) -> Option<CancelReason> {
		*self.rx.borrow()
	}

	pub fn is_cancelled(&self) -> bool {
		self.reason().is_some()
	}

	/// Resolves once cancelled; pends forever if the handle is dropped first.
	pub async fn cancelled(&self) -> CancelReason {
		let mut rx = self.rx.clone();
		let outcome = rx.wait_for(|reason| reason.is_some()).await.map(|reason| *reason);
		match outcome {
			Ok(Some(reason)) => reason,
			Ok(None) => CancelReason::Caller,
			Err(_) => std::future::pending().await,
		}
	}
}
