use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::scheduler::Scheduler;
use crate::token::MainToken;

/// Failure of a bridged call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
	/// The executor dropped the work before it ran.
	#[error("call cancelled before completion")]
	Cancelled,

	/// The work panicked while executing.
	#[error("call panicked: {0}")]
	Panicked(String),
}

/// Result of work dispatched across the thread-affinity boundary.
///
/// Either already resolved (work ran in place) or pending on a completion
/// channel. Consumed by awaiting, blocking, or attaching a continuation.
pub struct SyncCall<T> {
	state: CallState<T>,
}

enum CallState<T> {
	Ready(Result<T, CallError>),
	Pending(oneshot::Receiver<Result<T, CallError>>),
}

impl<T> SyncCall<T> {
	/// Wraps an already-computed outcome.
	pub fn ready(outcome: Result<T, CallError>) -> Self {
		Self {
			state: CallState::Ready(outcome),
		}
	}

	pub(crate) fn pending(rx: oneshot::Receiver<Result<T, CallError>>) -> Self {
		Self {
			state: CallState::Pending(rx),
		}
	}

	/// Returns whether the outcome is already available without waiting.
	pub fn is_ready(&self) -> bool {
		matches!(self.state, CallState::Ready(_))
	}

	/// Awaits the outcome.
	pub async fn join(self) -> Result<T, CallError> {
		match self.state {
			CallState::Ready(outcome) => outcome,
			CallState::Pending(rx) => rx.await.unwrap_or_else(|_| Err(CallError::Cancelled)),
		}
	}

	/// Blocks the calling thread until the outcome is available.
	///
	/// Must not be called from an async context or from the authoritative
	/// context while the work is queued behind the caller.
	pub fn wait(self) -> Result<T, CallError> {
		match self.state {
			CallState::Ready(outcome) => outcome,
			CallState::Pending(rx) => rx.blocking_recv().unwrap_or_else(|_| Err(CallError::Cancelled)),
		}
	}
}

impl<T> SyncCall<T>
where
	T: Send + 'static,
{
	/// Routes the outcome to the authoritative context without blocking the
	/// caller: a worker task awaits this call, then dispatches `on_ok` or
	/// `on_err` to the main lane with a token in hand.
	pub fn then_on_main(
		self,
		sched: &Scheduler,
		on_ok: impl FnOnce(&MainToken, T) + Send + 'static,
		on_err: impl FnOnce(&MainToken, CallError) + Send + 'static,
	) {
		let resume = sched.clone();
		sched.spawn_worker(async move {
			let outcome = self.join().await;
			resume.run_on_main(move |token| match outcome {
				Ok(value) => on_ok(token, value),
				Err(err) => on_err(token, err),
			});
		});
	}

	/// Routes the outcome to a worker without blocking the caller.
	pub fn then_on_worker(self, sched: &Scheduler, on_ok: impl FnOnce(T) + Send + 'static, on_err: impl FnOnce(CallError) + Send + 'static) {
		sched.spawn_worker(async move {
			match self.join().await {
				Ok(value) => on_ok(value),
				Err(err) => on_err(err),
			}
		});
	}
}

impl Scheduler {
	/// Obtains the result of work that must run on the authoritative context.
	///
	/// When the calling thread already is that context the work runs in place
	/// and the returned call is immediately ready; otherwise the work is
	/// dispatched and the call resolves asynchronously.
	pub fn call_on_main<T, F>(&self, work: F) -> SyncCall<T>
	where
		T: Send + 'static,
		F: FnOnce(&MainToken) -> T + Send + 'static,
	{
		if let Some(token) = self.token_if_authoritative() {
			return SyncCall::ready(run_caught(|| work(&token)));
		}
		let (tx, rx) = oneshot::channel();
		self.run_on_main(move |token| {
			let _ = tx.send(run_caught(|| work(token)));
		});
		SyncCall::pending(rx)
	}

	/// Dispatches blocking work to the worker pool and returns its pending
	/// result.
	pub fn call_on_worker<T, F>(&self, work: F) -> SyncCall<T>
	where
		T: Send + 'static,
		F: FnOnce() -> T + Send + 'static,
	{
		let (tx, rx) = oneshot::channel();
		self.spawn_worker_blocking(move || {
			let _ = tx.send(run_caught(work));
		});
		SyncCall::pending(rx)
	}
}

/// Wraps fallible work so its error reaches `handler` instead of propagating
/// uncaught through a fire-and-forget schedule.
pub fn guarded<E, W, H>(work: W, handler: H) -> impl FnOnce()
where
	W: FnOnce() -> Result<(), E>,
	H: FnOnce(E),
{
	move || {
		if let Err(err) = work() {
			handler(err);
		}
	}
}

fn run_caught<T>(work: impl FnOnce() -> T) -> Result<T, CallError> {
	catch_unwind(AssertUnwindSafe(work)).map_err(|payload| CallError::Panicked(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"opaque panic payload".to_owned()
	}
}
