//! Persistence for the deleted-canvas-id set.
//!
//! Primary format: consecutive big-endian 32-bit ids, no header, no count,
//! terminated by end-of-stream. A legacy structured file (one JSON object
//! holding an `ids` array) is detected on load and migrated: the binary file
//! is written and the legacy file renamed as a backup.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::ids::CanvasId;

pub(crate) const BINARY_FILE: &str = "deleted.bin";
pub(crate) const LEGACY_FILE: &str = "deleted.json";
pub(crate) const LEGACY_BACKUP: &str = "deleted.json.bak";

#[derive(Serialize, Deserialize)]
struct LegacyDeletedFile {
	ids: Vec<i32>,
}

fn decode(bytes: &[u8]) -> HashSet<CanvasId> {
	let mut buf = bytes;
	let mut ids = HashSet::new();
	// A trailing partial record reads as end-of-stream, matching a writer
	// that died mid-record.
	while buf.remaining() >= 4 {
		ids.insert(CanvasId(buf.get_i32()));
	}
	ids
}

fn encode(ids: &HashSet<CanvasId>) -> Bytes {
	let mut buf = BytesMut::with_capacity(ids.len() * 4);
	for id in ids {
		buf.put_i32(id.0);
	}
	buf.freeze()
}

/// Loads the deleted-id set from `dir`, migrating the legacy format when the
/// binary file is absent. I/O and parse failures are logged and yield an
/// empty set; they never abort the caller.
pub(crate) async fn load(dir: &Path) -> HashSet<CanvasId> {
	let binary = dir.join(BINARY_FILE);
	match tokio::fs::read(&binary).await {
		Ok(bytes) => return decode(&bytes),
		Err(err) if err.kind() == ErrorKind::NotFound => {}
		Err(err) => {
			tracing::error!(path = %binary.display(), %err, "registry.deleted.load_failed");
			return HashSet::new();
		}
	}

	let legacy = dir.join(LEGACY_FILE);
	let bytes = match tokio::fs::read(&legacy).await {
		Ok(bytes) => bytes,
		Err(err) => {
			if err.kind() != ErrorKind::NotFound {
				tracing::error!(path = %legacy.display(), %err, "registry.deleted.load_failed");
			}
			return HashSet::new();
		}
	};
	let ids = match serde_json::from_slice::<LegacyDeletedFile>(&bytes) {
		Ok(file) => file.ids.into_iter().map(CanvasId).collect::<HashSet<_>>(),
		Err(err) => {
			tracing::error!(path = %legacy.display(), %err, "registry.deleted.legacy_parse_failed");
			return HashSet::new();
		}
	};

	tracing::info!(path = %legacy.display(), ids = ids.len(), "registry.deleted.migrating_legacy");
	match save(dir, &ids).await {
		Ok(()) => {
			if let Err(err) = tokio::fs::rename(&legacy, dir.join(LEGACY_BACKUP)).await {
				tracing::error!(path = %legacy.display(), %err, "registry.deleted.legacy_backup_failed");
			}
		}
		Err(err) => tracing::error!(dir = %dir.display(), %err, "registry.deleted.save_failed"),
	}
	ids
}

/// Persists the set: full write to a scratch file, then rename over the
/// primary, so a crash mid-write never leaves a torn file behind.
pub(crate) async fn save(dir: &Path, ids: &HashSet<CanvasId>) -> std::io::Result<()> {
	tokio::fs::create_dir_all(dir).await?;
	let scratch = dir.join(format!("{BINARY_FILE}.tmp"));
	tokio::fs::write(&scratch, encode(ids)).await?;
	tokio::fs::rename(&scratch, dir.join(BINARY_FILE)).await?;
	Ok(())
}
