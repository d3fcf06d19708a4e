use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Cancelable handle for one scheduled unit of work.
///
/// Cloning shares the underlying cancellation state. Cancelling a unit that
/// has already completed, or is currently running, is a no-op.
#[derive(Debug, Clone)]
pub struct TaskHandle {
	owner: Arc<str>,
	cancel: CancellationToken,
}

impl TaskHandle {
	pub(crate) fn new(owner: Arc<str>) -> Self {
		Self {
			owner,
			cancel: CancellationToken::new(),
		}
	}

	/// Name of the scheduler that issued this handle.
	pub fn owner(&self) -> &str {
		&self.owner
	}

	/// Returns whether cancellation has been requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests cancellation.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub(crate) fn token(&self) -> &CancellationToken {
		&self.cancel
	}
}
