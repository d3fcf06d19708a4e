use std::fmt;
use std::time::Duration;

use uuid::Uuid;

/// One environment tick of real time.
pub const TICK: Duration = Duration::from_millis(50);

/// First canvas id of the synthetic range.
///
/// Ids at or above the watermark are never issued by the environment, so
/// synthetic allocations can never collide with real canvases.
pub const FAKE_ID_WATERMARK: i32 = i32::MAX / 4 * 3;

/// Registry-assigned index of a mural.
///
/// Monotonically increasing and never reused while the registry is alive.
/// The decimal rendering names the mural's on-disk directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MuralIndex(pub u32);

impl fmt::Display for MuralIndex {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Identifier in the environment's addressable canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanvasId(pub i32);

impl CanvasId {
	/// Returns whether this id belongs to the synthetic range.
	pub fn is_fake(self) -> bool {
		self.0 >= FAKE_ID_WATERMARK
	}
}

impl fmt::Display for CanvasId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Identity of one registry instance.
///
/// Murals designate the registry they belong to; registration rejects a
/// mural bound elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryId(Uuid);

impl RegistryId {
	pub(crate) fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl fmt::Display for RegistryId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}
