use std::fmt;
use std::sync::Arc;

use weft_primitives::{CancellationToken, Result, VersionStamp};

use crate::LazyValueCell;

/// A lazily held value paired with the version of the content it represents.
///
/// Immutable once built. Two snapshots with the same stamp are treated as the
/// same content without re-deriving either value.
pub struct VersionedSnapshot<T> {
	value: LazyValueCell<T>,
	version: VersionStamp,
}

impl<T> VersionedSnapshot<T>
where
	T: Send + Sync + 'static,
{
	/// Pairs `value` with `version`.
	pub fn new(value: LazyValueCell<T>, version: VersionStamp) -> Self {
		Self { value, version }
	}

	/// Version of the held content.
	#[inline]
	pub fn version(&self) -> VersionStamp {
		self.version
	}

	/// Underlying cell.
	#[inline]
	pub fn cell(&self) -> &LazyValueCell<T> {
		&self.value
	}

	/// See [`LazyValueCell::get`].
	pub fn get(&self, cancel: &CancellationToken) -> Result<Arc<T>> {
		self.value.get(cancel)
	}

	/// See [`LazyValueCell::try_get_cached`].
	pub fn try_get_cached(&self) -> Option<Arc<T>> {
		self.value.try_get_cached()
	}

	/// See [`LazyValueCell::evict`].
	pub fn evict(&self) -> bool {
		self.value.evict()
	}
}

impl<T> fmt::Debug for VersionedSnapshot<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VersionedSnapshot")
			.field("version", &self.version)
			.field("value", &self.value)
			.finish()
	}
}
