use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::TaskHandle;
use crate::token::MainToken;

/// Work accepted by the authoritative context.
pub(crate) enum MainJob {
	Once(Box<dyn FnOnce(&MainToken) + Send>),
	Periodic {
		period: Duration,
		body: Box<dyn FnMut(&MainToken) + Send>,
	},
}

struct Entry {
	due: Instant,
	seq: u64,
	handle: TaskHandle,
	job: MainJob,
}

impl PartialEq for Entry {
	fn eq(&self, other: &Self) -> bool {
		self.due == other.due && self.seq == other.seq
	}
}

impl Eq for Entry {}

impl PartialOrd for Entry {
	fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
		Some(self.cmp(other))
	}
}

impl Ord for Entry {
	// Reversed so the earliest due entry surfaces first in the max-heap;
	// seq breaks ties in submission order.
	fn cmp(&self, other: &Self) -> CmpOrdering {
		other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
	}
}

struct Queue {
	entries: BinaryHeap<Entry>,
	seq: u64,
}

impl Queue {
	fn next_seq(&mut self) -> u64 {
		self.seq = self.seq.wrapping_add(1);
		self.seq
	}
}

struct Shared {
	queue: Mutex<Queue>,
	signal: Condvar,
	shutdown: AtomicBool,
	thread: OnceLock<ThreadId>,
}

/// Executor for the single authoritative context.
///
/// Owns a dedicated named OS thread draining a due-time ordered job queue.
/// Jobs execute outside the queue lock; a panicking job is caught, logged and
/// (for periodic jobs) cancelled — it never takes the thread down.
#[derive(Clone)]
pub struct MainExecutor {
	shared: Arc<Shared>,
}

impl MainExecutor {
	pub(crate) fn start(thread_name: &str) -> Self {
		let shared = Arc::new(Shared {
			queue: Mutex::new(Queue {
				entries: BinaryHeap::new(),
				seq: 0,
			}),
			signal: Condvar::new(),
			shutdown: AtomicBool::new(false),
			thread: OnceLock::new(),
		});
		let loop_shared = Arc::clone(&shared);
		thread::Builder::new()
			.name(thread_name.to_owned())
			.spawn(move || run_loop(loop_shared))
			.expect("failed to spawn mural main-context thread");
		Self { shared }
	}

	/// Returns whether the calling thread is the authoritative context.
	pub fn is_authoritative(&self) -> bool {
		self.shared.thread.get() == Some(&thread::current().id())
	}

	/// Mints a token when called from the authoritative context itself.
	pub(crate) fn token_if_authoritative(&self) -> Option<MainToken> {
		self.is_authoritative().then(MainToken::new)
	}

	pub(crate) fn submit(&self, delay: Duration, handle: TaskHandle, job: MainJob) {
		if self.shared.shutdown.load(Ordering::Acquire) {
			tracing::warn!(owner = handle.owner(), "sched.main.submit_after_shutdown");
			return;
		}
		let mut queue = self.shared.queue.lock();
		let seq = queue.next_seq();
		queue.entries.push(Entry {
			due: Instant::now() + delay,
			seq,
			handle,
			job,
		});
		drop(queue);
		self.shared.signal.notify_one();
	}

	/// Stops the authoritative thread and drops every queued job.
	///
	/// Dropping a queued job releases its completion channel, so pending
	/// bridge calls resolve as cancelled rather than hanging.
	pub(crate) fn shutdown(&self) {
		self.shared.shutdown.store(true, Ordering::Release);
		let mut queue = self.shared.queue.lock();
		queue.entries.clear();
		drop(queue);
		self.shared.signal.notify_all();
	}
}

fn run_loop(shared: Arc<Shared>) {
	let _ = shared.thread.set(thread::current().id());
	let token = MainToken::new();
	loop {
		let entry = {
			let mut queue = shared.queue.lock();
			loop {
				if shared.shutdown.load(Ordering::Acquire) {
					return;
				}
				match queue.entries.peek() {
					Some(head) if head.due <= Instant::now() => {
						break queue.entries.pop().expect("peeked entry vanished");
					}
					Some(head) => {
						let due = head.due;
						shared.signal.wait_until(&mut queue, due);
					}
					None => shared.signal.wait(&mut queue),
				}
			}
		};
		if entry.handle.is_cancelled() {
			continue;
		}
		match entry.job {
			MainJob::Once(body) => {
				if catch_unwind(AssertUnwindSafe(|| body(&token))).is_err() {
					tracing::error!(owner = entry.handle.owner(), "sched.main.job_panicked");
				}
			}
			MainJob::Periodic { period, mut body } => {
				if catch_unwind(AssertUnwindSafe(|| body(&token))).is_err() {
					tracing::error!(owner = entry.handle.owner(), "sched.main.job_panicked");
					entry.handle.cancel();
				}
				if !entry.handle.is_cancelled() && !shared.shutdown.load(Ordering::Acquire) {
					let mut queue = shared.queue.lock();
					let seq = queue.next_seq();
					queue.entries.push(Entry {
						due: Instant::now() + period,
						seq,
						handle: entry.handle,
						job: MainJob::Periodic { period, body },
					});
				}
			}
		}
	}
}
