use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while importing external source data.
#[derive(Debug, Error)]
pub enum ImportError {
	/// A source or asset file could not be read.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A source record was structurally invalid.
	#[error("malformed source record: {0}")]
	Malformed(String),

	/// Any other collaborator failure.
	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

/// Result type for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;
