use thiserror::Error;
use uuid::Uuid;

/// Errors raised by registry mutations.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// The mural designates a different registry as its owner.
	#[error("mural is bound to a different registry")]
	OwnershipMismatch,

	/// The (owner, name) pair is already registered, compared case-insensitively.
	#[error("duplicate mural name {name:?} for owner {owner}")]
	DuplicateName {
		/// Owner whose namespace collided.
		owner: Uuid,
		/// Name as supplied by the rejected mural.
		name: String,
	},

	/// The mural failed to persist itself; the insertion was rolled back.
	#[error("mural failed to persist")]
	Persist(#[source] anyhow::Error),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
