use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mural_registry::{Mural, MuralRegistry};
use uuid::Uuid;

use crate::error::Result;

/// One record of the external source describing a mural to import.
#[derive(Debug, Clone)]
pub struct ImportRecord {
	/// Identifier the record carried in the external source.
	pub external_id: String,
	/// Legacy canvas ids, row-major, keying the raw image assets.
	pub canvas_ids: Vec<i32>,
	/// Grid width in canvases.
	pub columns: u32,
	/// Grid height in canvases.
	pub rows: u32,
}

/// Format-specific parser for one per-owner source file.
#[async_trait]
pub trait SourceFormat: Send + Sync + 'static {
	/// Parses the file into its records.
	async fn read_records(&self, file: &Path) -> Result<Vec<ImportRecord>>;
}

/// Builds a ready-to-register mural from one parsed record.
#[async_trait]
pub trait ImportFactory: Send + Sync + 'static {
	/// Constructs the mural, reading its pixels from `assets_dir`.
	async fn build(&self, registry: Arc<MuralRegistry>, owner: Uuid, name: &str, record: &ImportRecord, assets_dir: &Path) -> Result<Arc<dyn Mural>>;
}
