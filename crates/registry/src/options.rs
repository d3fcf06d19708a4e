use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::ids::TICK;

/// Layout and tuning options for one registry instance.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryOptions {
	/// Directory holding per-mural subdirectories and the deleted-id file.
	pub(crate) data_dir: PathBuf,
	/// Murals dispatched per batch during a bulk load.
	#[serde(default = "default_batch_size")]
	pub(crate) load_batch_size: usize,
	/// Cadence of the animation tick counter.
	#[serde(default = "default_tick_period")]
	pub(crate) tick_period: Duration,
	/// Canvas-id ranges exempt from stale-reference neutralization.
	#[serde(default)]
	pub(crate) exempt_deleted: Vec<RangeInclusive<i32>>,
}

impl RegistryOptions {
	/// Creates options rooted at `data_dir` with default tuning.
	pub fn new(data_dir: impl Into<PathBuf>) -> Self {
		Self {
			data_dir: data_dir.into(),
			load_batch_size: default_batch_size(),
			tick_period: default_tick_period(),
			exempt_deleted: Vec::new(),
		}
	}

	/// Sets the bulk-load batch size.
	///
	/// # Panics
	///
	/// Panics if `size` is zero.
	#[must_use]
	pub fn load_batch_size(mut self, size: usize) -> Self {
		assert!(size > 0, "load batch size must be > 0");
		self.load_batch_size = size;
		self
	}

	/// Sets the animation tick cadence.
	#[must_use]
	pub fn tick_period(mut self, period: Duration) -> Self {
		self.tick_period = period;
		self
	}

	/// Exempts a canvas-id range from stale-reference neutralization.
	#[must_use]
	pub fn exempt_deleted(mut self, range: RangeInclusive<i32>) -> Self {
		self.exempt_deleted.push(range);
		self
	}

	/// Directory holding this registry's on-disk state.
	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}
}

fn default_batch_size() -> usize {
	10
}

fn default_tick_period() -> Duration {
	// 20 environment ticks, roughly one real second.
	TICK * 20
}
