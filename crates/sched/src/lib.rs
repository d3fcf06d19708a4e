//! Scheduling primitives for the mural canvas runtime.
//!
//! A shared multi-user environment owns exactly one *authoritative context*:
//! the only execution context allowed to touch environment-native state such
//! as canvases, physical displays and viewer sessions. Everything else —
//! disk I/O, image decoding, render-buffer composition — belongs on an
//! unordered worker pool.
//!
//! This crate provides both halves and the bridge between them:
//!
//! - [`Scheduler`] submits closures to either lane, immediately, after a
//!   delay, or on a fixed period, returning a cancelable [`TaskHandle`].
//! - [`MainToken`] is an unforgeable proof of executing on the authoritative
//!   context; main-lane jobs receive one and environment-facing APIs demand
//!   one.
//! - [`SyncCall`] carries results across the affinity boundary:
//!   [`Scheduler::call_on_main`] runs work in place when already on the
//!   authoritative context, and continuations resume on either lane without
//!   ever blocking the caller.
//! - [`Routine`] is a stateful unit of work bound to at most one schedule
//!   over its lifetime; a second submission is a caller defect and panics.

mod bridge;
mod handle;
mod lane;
mod main_loop;
mod routine;
mod scheduler;
mod token;

pub use bridge::{CallError, SyncCall, guarded};
pub use handle::TaskHandle;
pub use lane::Lane;
pub use main_loop::MainExecutor;
pub use routine::{Routine, RunContext, TaskAnchor, Timing};
pub use scheduler::Scheduler;
pub use token::MainToken;
