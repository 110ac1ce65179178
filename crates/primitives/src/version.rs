use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide stamp clock. Zero is never handed out.
static CLOCK: AtomicU64 = AtomicU64::new(0);

/// Monotonic version marker attached to a snapshot.
///
/// Stamps are totally ordered by creation: every [`VersionStamp::create`]
/// returns a value strictly greater than all stamps created before it in this
/// process, regardless of which thread created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionStamp(u64);

impl VersionStamp {
	/// Creates a new stamp, newer than every previously created one.
	pub fn create() -> Self {
		Self(CLOCK.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
	}

	/// Returns true if `self` was created after `other`.
	#[inline]
	pub fn is_newer_than(self, other: Self) -> bool {
		self > other
	}

	/// Returns whichever of the two stamps is newer.
	#[inline]
	pub fn newer_of(self, other: Self) -> Self {
		self.max(other)
	}

	/// Raw counter value, for logging.
	pub const fn get(self) -> u64 {
		self.0
	}
}
