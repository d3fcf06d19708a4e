use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::ids::CanvasId;
use crate::mural::Mural;
use crate::registry::MuralRegistry;

/// Edge length of one canvas in pixels.
pub const CANVAS_WIDTH: usize = 128;

/// One viewer-bound render result moving through the stage chain.
///
/// Owned by exactly one stage at a time: each stage receives the frame the
/// previous stage returned, so later stages observe earlier stages' output
/// without any shared aliasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
	/// Palette-indexed pixel buffer, row-major, canvas sized.
	pub pixels: Vec<u8>,
	/// Cursor overlay set drawn above the pixels.
	pub cursors: Vec<CursorMark>,
}

/// One cursor in the overlay set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorMark {
	pub x: i8,
	pub y: i8,
	/// Facing, in sixteenths of a full turn.
	pub direction: u8,
	/// Environment cursor glyph.
	pub kind: u8,
}

/// The all-`fill` placeholder frame attached to canvases of deleted murals.
///
/// `fill` is the host palette's blank value (typically its white).
pub fn retired_frame(fill: u8) -> RenderFrame {
	RenderFrame {
		pixels: vec![fill; CANVAS_WIDTH * CANVAS_WIDTH],
		cursors: Vec::new(),
	}
}

/// Identity of a registered render stage, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(u64);

/// Context for one render dispatch.
pub struct RenderPass<'a> {
	/// Registry dispatching the render.
	pub registry: &'a MuralRegistry,
	/// Mural whose canvas is being rendered.
	pub mural: &'a Arc<dyn Mural>,
	/// Canvas being rendered.
	pub canvas: CanvasId,
	/// Viewer the frame will be sent to.
	pub viewer: Uuid,
}

/// One stage of the render-interception chain.
///
/// Stages run in chain order on every render of a canvas for a viewer; the
/// frame returned by the final stage is what reaches that viewer. A
/// panicking stage aborts the render and propagates to the dispatcher.
pub trait RenderStage: Send + Sync + 'static {
	fn apply(&self, pass: &RenderPass<'_>, frame: RenderFrame) -> RenderFrame;
}

/// Ordered, mutable chain of render stages.
pub(crate) struct StageChain {
	stages: RwLock<Vec<(StageId, Arc<dyn RenderStage>)>>,
	next_id: AtomicU64,
}

impl StageChain {
	pub(crate) fn new() -> Self {
		Self {
			stages: RwLock::new(Vec::new()),
			next_id: AtomicU64::new(0),
		}
	}

	pub(crate) fn insert(&self, front: bool, stage: Arc<dyn RenderStage>) -> StageId {
		let id = StageId(self.next_id.fetch_add(1, Ordering::AcqRel));
		let mut stages = self.stages.write();
		if front {
			stages.insert(0, (id, stage));
		} else {
			stages.push((id, stage));
		}
		id
	}

	pub(crate) fn remove(&self, id: StageId) -> bool {
		let mut stages = self.stages.write();
		let before = stages.len();
		stages.retain(|(stage_id, _)| *stage_id != id);
		stages.len() != before
	}

	pub(crate) fn run(&self, pass: &RenderPass<'_>, frame: RenderFrame) -> RenderFrame {
		// Snapshot so a stage may mutate the chain mid-render without
		// affecting the pass already in flight.
		let stages: Vec<Arc<dyn RenderStage>> = self.stages.read().iter().map(|(_, stage)| Arc::clone(stage)).collect();
		stages.into_iter().fold(frame, |frame, stage| stage.apply(pass, frame))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn retired_frame_is_canvas_sized_and_uniform() {
		let frame = retired_frame(0x22);
		assert_eq!(frame.pixels.len(), CANVAS_WIDTH * CANVAS_WIDTH);
		assert!(frame.pixels.iter().all(|pixel| *pixel == 0x22));
		assert!(frame.cursors.is_empty());
	}
}
