use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::lane::Lane;
use crate::main_loop::{MainExecutor, MainJob};
use crate::routine::{Routine, RunContext, Timing};
use crate::token::MainToken;
use crate::TaskHandle;

/// Worker-pool backing: the ambient tokio runtime when one exists, otherwise
/// an owned fallback runtime so the scheduler works from plain threads.
struct AsyncPool {
	handle: tokio::runtime::Handle,
	_owned: Option<Arc<tokio::runtime::Runtime>>,
}

impl AsyncPool {
	fn resolve(thread_name: &str) -> Self {
		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			return Self { handle, _owned: None };
		}
		let runtime = tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name(thread_name)
			.build()
			.expect("failed to build mural worker runtime");
		let handle = runtime.handle().clone();
		Self {
			handle,
			_owned: Some(Arc::new(runtime)),
		}
	}
}

struct SchedulerInner {
	name: Arc<str>,
	main: MainExecutor,
	pool: AsyncPool,
}

impl Drop for SchedulerInner {
	fn drop(&mut self) {
		self.main.shutdown();
	}
}

/// Submission front-end for both execution lanes.
///
/// Owns the authoritative-context executor and a worker pool. Cloning is
/// cheap and shares both; the authoritative thread stops when the last clone
/// drops.
#[derive(Clone)]
pub struct Scheduler {
	inner: Arc<SchedulerInner>,
}

impl Scheduler {
	/// Creates a named scheduler and starts its authoritative thread.
	pub fn new(name: impl Into<String>) -> Self {
		let name: Arc<str> = Arc::from(name.into());
		let main = MainExecutor::start(&format!("{name}-main"));
		let pool = AsyncPool::resolve(&format!("{name}-worker"));
		tracing::debug!(scheduler = %name, "sched.start");
		Self {
			inner: Arc::new(SchedulerInner { name, main, pool }),
		}
	}

	/// Scheduler name, reported as the owner of every issued handle.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// The authoritative-context executor.
	pub fn main(&self) -> &MainExecutor {
		&self.inner.main
	}

	fn new_handle(&self) -> TaskHandle {
		TaskHandle::new(Arc::clone(&self.inner.name))
	}

	fn trace_submit(&self, lane: Lane) {
		tracing::trace!(scheduler = %self.inner.name, lane = lane.as_str(), "sched.submit");
	}

	/// Spawns a future onto the worker pool, returning its join handle.
	pub fn spawn<F>(&self, fut: F) -> tokio::task::JoinHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		tracing::trace!(scheduler = %self.inner.name, lane = Lane::Worker.as_str(), "sched.spawn");
		self.inner.pool.handle.spawn(fut)
	}

	pub(crate) fn spawn_worker<F>(&self, fut: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		self.inner.pool.handle.spawn(fut);
	}

	pub(crate) fn spawn_worker_blocking<F>(&self, f: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.inner.pool.handle.spawn_blocking(f);
	}

	pub(crate) fn token_if_authoritative(&self) -> Option<MainToken> {
		self.inner.main.token_if_authoritative()
	}

	fn submit_main(&self, delay: Duration, job: MainJob) -> TaskHandle {
		self.trace_submit(Lane::Main);
		let handle = self.new_handle();
		self.inner.main.submit(delay, handle.clone(), job);
		handle
	}

	/// Runs `job` on the authoritative context as soon as possible.
	pub fn run_on_main(&self, job: impl FnOnce(&MainToken) + Send + 'static) -> TaskHandle {
		self.submit_main(Duration::ZERO, MainJob::Once(Box::new(job)))
	}

	/// Runs `job` on the authoritative context after `delay`.
	pub fn run_on_main_later(&self, delay: Duration, job: impl FnOnce(&MainToken) + Send + 'static) -> TaskHandle {
		self.submit_main(delay, MainJob::Once(Box::new(job)))
	}

	/// Runs `job` on the authoritative context every `period` after `delay`.
	///
	/// # Panics
	///
	/// Panics if `period` is zero.
	pub fn run_on_main_every(&self, delay: Duration, period: Duration, job: impl FnMut(&MainToken) + Send + 'static) -> TaskHandle {
		assert!(!period.is_zero(), "period must be non-zero");
		self.submit_main(
			delay,
			MainJob::Periodic {
				period,
				body: Box::new(job),
			},
		)
	}

	/// Runs `job` on the worker pool as soon as possible.
	pub fn run_on_worker(&self, job: impl FnOnce() + Send + 'static) -> TaskHandle {
		self.trace_submit(Lane::Worker);
		let handle = self.new_handle();
		let cancel = handle.token().clone();
		self.spawn_worker(async move {
			if !cancel.is_cancelled() {
				job();
			}
		});
		handle
	}

	/// Runs `job` on the worker pool after `delay`.
	pub fn run_on_worker_later(&self, delay: Duration, job: impl FnOnce() + Send + 'static) -> TaskHandle {
		self.trace_submit(Lane::Worker);
		let handle = self.new_handle();
		let cancel = handle.token().clone();
		self.spawn_worker(async move {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {}
				_ = tokio::time::sleep(delay) => job(),
			}
		});
		handle
	}

	/// Runs `job` on the worker pool every `period` after `delay`.
	///
	/// # Panics
	///
	/// Panics if `period` is zero.
	pub fn run_on_worker_every(&self, delay: Duration, period: Duration, mut job: impl FnMut() + Send + 'static) -> TaskHandle {
		assert!(!period.is_zero(), "period must be non-zero");
		self.trace_submit(Lane::Worker);
		let handle = self.new_handle();
		let cancel = handle.token().clone();
		self.spawn_worker(async move {
			let mut next = tokio::time::Instant::now() + delay;
			loop {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => break,
					_ = tokio::time::sleep_until(next) => {
						job();
						next += period;
					}
				}
			}
		});
		handle
	}

	/// Submits a stateful routine to `lane` with the given `timing`.
	///
	/// The routine's anchor is bound before dispatch, so a routine can only
	/// ever be submitted once.
	///
	/// # Panics
	///
	/// Panics if the routine has already been submitted, or if a periodic
	/// timing carries a zero period.
	pub fn submit_routine(&self, lane: Lane, timing: Timing, routine: Arc<dyn Routine>) -> TaskHandle {
		let handle = self.new_handle();
		routine.anchor().bind(handle.clone());
		self.trace_submit(lane);

		let run_handle = handle.clone();
		match lane {
			Lane::Main => {
				let job = move |token: &MainToken| {
					let cx = RunContext::new(Some(token), &run_handle);
					routine.run(&cx);
				};
				match timing {
					Timing::Now => self.inner.main.submit(Duration::ZERO, handle.clone(), MainJob::Once(Box::new(move |t| job(t)))),
					Timing::After(delay) => self.inner.main.submit(delay, handle.clone(), MainJob::Once(Box::new(move |t| job(t)))),
					Timing::Every { delay, period } => {
						assert!(!period.is_zero(), "period must be non-zero");
						self.inner.main.submit(
							delay,
							handle.clone(),
							MainJob::Periodic {
								period,
								body: Box::new(move |t| job(t)),
							},
						);
					}
				}
			}
			Lane::Worker => {
				let job = move || {
					let cx = RunContext::new(None, &run_handle);
					routine.run(&cx);
				};
				let cancel = handle.token().clone();
				match timing {
					Timing::Now => self.spawn_worker(async move {
						if !cancel.is_cancelled() {
							job();
						}
					}),
					Timing::After(delay) => self.spawn_worker(async move {
						tokio::select! {
							biased;
							_ = cancel.cancelled() => {}
							_ = tokio::time::sleep(delay) => job(),
						}
					}),
					Timing::Every { delay, period } => {
						assert!(!period.is_zero(), "period must be non-zero");
						self.spawn_worker(async move {
							let mut next = tokio::time::Instant::now() + delay;
							loop {
								tokio::select! {
									biased;
									_ = cancel.cancelled() => break,
									_ = tokio::time::sleep_until(next) => {
										job();
										next += period;
									}
								}
							}
						});
					}
				}
			}
		}
		handle
	}
}
