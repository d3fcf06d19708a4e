use std::time::Duration;

use parking_lot::Mutex;

use crate::TaskHandle;
use crate::token::MainToken;

/// When a routine submission should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
	/// As soon as possible.
	Now,
	/// Once, after the delay.
	After(Duration),
	/// Repeatedly, first after `delay`, then every `period`.
	Every { delay: Duration, period: Duration },
}

/// Execution context handed to a running routine.
///
/// `main()` is `Some` exactly when the routine is executing on the
/// authoritative context. The handle lets a routine cancel itself, which is
/// how periodic routines terminate.
pub struct RunContext<'a> {
	main: Option<&'a MainToken>,
	handle: &'a TaskHandle,
}

impl<'a> RunContext<'a> {
	pub(crate) fn new(main: Option<&'a MainToken>, handle: &'a TaskHandle) -> Self {
		Self { main, handle }
	}

	/// Token proving authoritative-context execution, when on that lane.
	pub fn main(&self) -> Option<&'a MainToken> {
		self.main
	}

	/// Handle of this routine's schedule.
	pub fn handle(&self) -> &'a TaskHandle {
		self.handle
	}
}

/// Stateful unit of work bound to at most one schedule over its lifetime.
///
/// Implementors embed a [`TaskAnchor`] that records the binding. Submitting
/// the same routine twice is a caller defect and panics.
pub trait Routine: Send + Sync + 'static {
	/// Scheduling state owned by this routine.
	fn anchor(&self) -> &TaskAnchor;

	/// One execution of the routine.
	fn run(&self, cx: &RunContext<'_>);
}

/// Single-use scheduling slot embedded in a [`Routine`].
#[derive(Debug, Default)]
pub struct TaskAnchor {
	slot: Mutex<Option<TaskHandle>>,
}

impl TaskAnchor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns whether the bound schedule has been cancelled.
	///
	/// # Panics
	///
	/// Panics if the routine has never been submitted.
	pub fn is_cancelled(&self) -> bool {
		self.slot.lock().as_ref().expect("routine has not been scheduled").is_cancelled()
	}

	/// Cancels the bound schedule.
	///
	/// # Panics
	///
	/// Panics if the routine has never been submitted.
	pub fn cancel(&self) {
		self.slot.lock().as_ref().expect("routine has not been scheduled").cancel();
	}

	pub(crate) fn bind(&self, handle: TaskHandle) {
		let mut slot = self.slot.lock();
		assert!(slot.is_none(), "routine already bound to a schedule");
		*slot = Some(handle);
	}
}
