/// Execution lanes for scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
	/// The single authoritative context permitted to touch environment-native state.
	Main,
	/// Unordered background workers for disk I/O, decoding and composition.
	Worker,
}

impl Lane {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Main => "main",
			Self::Worker => "worker",
		}
	}
}
