use std::sync::atomic::{AtomicI32, Ordering};

use crate::ids::{CanvasId, FAKE_ID_WATERMARK};

/// Issues synthetic canvas ids from the reserved high range.
///
/// Allocations are strictly increasing and collision-free under arbitrary
/// concurrent callers, always at or above the watermark. If the counter is
/// ever observed below the watermark it snaps back on the next allocation.
#[derive(Debug)]
pub struct FakeIdAllocator {
	next: AtomicI32,
}

impl FakeIdAllocator {
	pub fn new() -> Self {
		Self {
			next: AtomicI32::new(FAKE_ID_WATERMARK),
		}
	}

	/// Allocates the next synthetic canvas id.
	pub fn allocate(&self) -> CanvasId {
		let previous = self
			.next
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
				Some(if id < FAKE_ID_WATERMARK { FAKE_ID_WATERMARK + 1 } else { id + 1 })
			})
			.expect("fake-id update cannot fail");
		CanvasId(previous.max(FAKE_ID_WATERMARK))
	}

	#[cfg(test)]
	fn corrupt(&self, value: i32) {
		self.next.store(value, Ordering::Release);
	}
}

impl Default for FakeIdAllocator {
	fn default() -> Self {
		Self::new()
	}
}
