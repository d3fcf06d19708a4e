use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use mural_sched::MainToken;
use uuid::Uuid;

use crate::ids::{CanvasId, MuralIndex, RegistryId};
use crate::registry::MuralRegistry;

/// A logical image entity owning one or more canvases.
///
/// The registry never looks inside a mural's pixel or animation state. It
/// tracks identity, ownership and canvas membership, and drives persistence
/// through [`save`](Mural::save); everything else — decoding, resizing, the
/// on-disk layout inside the mural's directory — is the mural's own business.
#[async_trait]
pub trait Mural: Send + Sync + 'static {
	/// Registry this mural designates as its owner.
	fn registry_id(&self) -> RegistryId;

	/// Identity of the creating owner.
	fn owner(&self) -> Uuid;

	/// Name, unique per owner compared case-insensitively.
	fn name(&self) -> &str;

	/// Assigned index, `None` until first registration.
	fn index(&self) -> Option<MuralIndex>;

	/// Called by the registry exactly once, when a fresh index is assigned.
	fn bind_index(&self, index: MuralIndex);

	/// Canvas ids backing this mural.
	fn canvases(&self) -> Vec<CanvasId>;

	/// Whether this mural's canvases join the deleted-id set on deletion.
	fn track_deleted_canvases(&self) -> bool {
		true
	}

	/// Persists the mural into its per-index directory.
	async fn save(&self) -> anyhow::Result<()>;

	/// Marks the mural unusable after deletion.
	fn invalidate(&self);

	/// Stops the mural's background activity (animation refresh, uploads).
	fn stop(&self);
}

/// Factory restoring murals from their per-index directories during a bulk
/// load.
#[async_trait]
pub trait MuralLoader: Send + Sync + 'static {
	/// Loads the mural persisted in `dir`.
	async fn load(&self, registry: Arc<MuralRegistry>, dir: PathBuf) -> anyhow::Result<Arc<dyn Mural>>;
}

/// Environment-native display surface access.
///
/// Every method demands a [`MainToken`]: canvases and the physical objects
/// they hang on may only be touched from the authoritative context.
pub trait DisplayHost: Send + Sync + 'static {
	/// Returns whether the canvas currently has any renderer attached.
	fn canvas_has_renderer(&self, token: &MainToken, id: CanvasId) -> bool;

	/// Attaches the retired placeholder renderer to the canvas.
	fn attach_retired_renderer(&self, token: &MainToken, id: CanvasId);

	/// Neutralizes one live stale reference to a deleted canvas.
	fn neutralize_stale(&self, token: &MainToken, id: CanvasId);
}
