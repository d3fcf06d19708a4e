//! Concurrent registry of image-backed canvas surfaces.
//!
//! A [`MuralRegistry`] owns the authoritative mapping from logical image
//! entities ([`Mural`]) to canvas identities: it assigns indices safely under
//! concurrency, persists and recovers which canvases have been permanently
//! retired (including legacy-format migration), issues synthetic canvas ids
//! from a reserved high range, and runs an ordered render-interception chain
//! over every frame sent to a viewer.
//!
//! Environment-native state (canvases, physical displays, viewer sessions)
//! is reachable only through the [`DisplayHost`] collaborator, whose methods
//! demand a [`mural_sched::MainToken`]; all cross-thread coordination goes
//! through the scheduler this registry is constructed with.

mod deleted;
mod error;
mod fake_id;
mod ids;
mod mural;
mod options;
mod registry;
mod render;

pub use error::{RegistryError, Result};
pub use fake_id::FakeIdAllocator;
pub use ids::{CanvasId, FAKE_ID_WATERMARK, MuralIndex, RegistryId, TICK};
pub use mural::{DisplayHost, Mural, MuralLoader};
pub use options::RegistryOptions;
pub use registry::{BulkLoadReport, MuralRegistry};
pub use render::{CANVAS_WIDTH, CursorMark, RenderFrame, RenderPass, RenderStage, StageId, retired_frame};
