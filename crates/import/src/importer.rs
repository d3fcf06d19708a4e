use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use mural_registry::MuralRegistry;
use uuid::Uuid;

use crate::record::{ImportFactory, SourceFormat};

/// Sentinel file created in the source directory once an import completes;
/// its presence alone marks the source as already migrated.
pub const MARKER_FILE: &str = "migrated.marker";

/// Outcome of one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
	/// Records imported and registered.
	pub migrated: usize,
	/// Records (or whole files) that failed and were skipped.
	pub failed: usize,
	/// Source files skipped because their name is not an owner identifier.
	pub skipped_files: usize,
}

/// Orchestrates one external source's import into a registry.
///
/// Each source file is handled on its own worker task; a failing record is
/// logged and skipped without aborting its file, and a failing file without
/// aborting the run. Generated names come from a per-importer counter, so
/// independent importers never interfere.
pub struct Importer {
	source_name: String,
	name_prefix: String,
	source_dir: PathBuf,
	assets_dir: PathBuf,
	format: Arc<dyn SourceFormat>,
	factory: Arc<dyn ImportFactory>,
	name_counter: AtomicU32,
}

impl Importer {
	pub fn new(
		source_name: impl Into<String>,
		source_dir: impl Into<PathBuf>,
		assets_dir: impl Into<PathBuf>,
		format: Arc<dyn SourceFormat>,
		factory: Arc<dyn ImportFactory>,
	) -> Arc<Self> {
		Arc::new(Self {
			source_name: source_name.into(),
			name_prefix: "Mural".to_owned(),
			source_dir: source_dir.into(),
			assets_dir: assets_dir.into(),
			format,
			factory,
			name_counter: AtomicU32::new(1),
		})
	}

	/// External source name, used as the last-resort name prefix.
	pub fn source_name(&self) -> &str {
		&self.source_name
	}

	/// Runs the import. A no-op when the sentinel file already exists.
	pub async fn run(self: &Arc<Self>, registry: &Arc<MuralRegistry>) -> ImportReport {
		let marker = self.source_dir.join(MARKER_FILE);
		match tokio::fs::try_exists(&marker).await {
			Ok(true) => {
				tracing::info!(source = %self.source_name, "import.already_migrated");
				return ImportReport::default();
			}
			Ok(false) => {}
			Err(err) => {
				tracing::error!(source = %self.source_name, path = %marker.display(), %err, "import.marker_check_failed");
				return ImportReport::default();
			}
		}

		let mut report = ImportReport::default();
		let mut joins = Vec::new();

		let mut entries = match tokio::fs::read_dir(&self.source_dir).await {
			Ok(entries) => entries,
			Err(err) => {
				tracing::error!(source = %self.source_name, dir = %self.source_dir.display(), %err, "import.source_dir_missing");
				return ImportReport::default();
			}
		};
		while let Ok(Some(entry)) = entries.next_entry().await {
			let path = entry.path();
			if !entry.file_type().await.map(|kind| kind.is_file()).unwrap_or(false) {
				continue;
			}
			let stem = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
			let Ok(owner) = stem.parse::<Uuid>() else {
				tracing::warn!(source = %self.source_name, file = %path.display(), "import.unowned_file_skipped");
				report.skipped_files += 1;
				continue;
			};

			let importer = Arc::clone(self);
			let sched = registry.scheduler().clone();
			let registry = Arc::clone(registry);
			joins.push(sched.spawn(async move { importer.import_file(registry, owner, path).await }));
		}

		for join in joins {
			match join.await {
				Ok((migrated, failed)) => {
					report.migrated += migrated;
					report.failed += failed;
				}
				Err(err) => {
					tracing::error!(source = %self.source_name, %err, "import.file_task_failed");
					report.failed += 1;
				}
			}
		}

		if let Err(err) = tokio::fs::write(&marker, b"").await {
			tracing::error!(source = %self.source_name, path = %marker.display(), %err, "import.marker_write_failed");
		}
		tracing::info!(
			source = %self.source_name,
			migrated = report.migrated,
			failed = report.failed,
			skipped = report.skipped_files,
			"import.complete"
		);
		report
	}

	async fn import_file(&self, registry: Arc<MuralRegistry>, owner: Uuid, path: PathBuf) -> (usize, usize) {
		let records = match self.format.read_records(&path).await {
			Ok(records) => records,
			Err(err) => {
				tracing::warn!(source = %self.source_name, file = %path.display(), %err, "import.file_failed");
				return (0, 1);
			}
		};

		let mut migrated = 0;
		let mut failed = 0;
		for (position, record) in records.into_iter().enumerate() {
			let generated = format!("{}-{}", self.name_prefix, self.name_counter.fetch_add(1, Ordering::AcqRel));
			// Collision ladder: generated name, then the record's own id,
			// then the source-prefixed id.
			let name = if registry.by_owner_and_name(owner, &generated).is_none() {
				generated
			} else if registry.by_owner_and_name(owner, &record.external_id).is_none() {
				record.external_id.clone()
			} else {
				format!("{}-{}", self.source_name, record.external_id)
			};

			let built = self.factory.build(Arc::clone(&registry), owner, &name, &record, &self.assets_dir).await;
			let outcome = match built {
				Ok(mural) => registry.register(mural).await.map_err(anyhow::Error::from),
				Err(err) => Err(anyhow::Error::from(err)),
			};
			match outcome {
				Ok(()) => {
					tracing::info!(source = %self.source_name, file = %path.display(), name = %name, owner = %owner, "import.record_migrated");
					migrated += 1;
				}
				Err(err) => {
					tracing::warn!(source = %self.source_name, file = %path.display(), record = position, %err, "import.record_failed");
					failed += 1;
				}
			}
		}
		(migrated, failed)
	}
}
