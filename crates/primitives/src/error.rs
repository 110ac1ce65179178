//! Error types for cache, document, and worker operations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::Fingerprint;

/// Key under which a value is written to a durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(pub u64);

impl StoreKey {
	/// Allocates a process-unique key.
	pub fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(0);
		Self(NEXT.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
	}
}

impl fmt::Display for StoreKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "store#{}", self.0)
	}
}

/// Errors produced by the cache core.
///
/// `Cancelled` and `SourceUnavailable` are ordinary outcomes handled by the
/// immediate caller. `Unsupported` and `PreconditionViolated` indicate misuse
/// of the API and are never expected in correct programs.
#[derive(Debug, Error)]
pub enum Error {
	/// The operation was abandoned because its cancellation token fired.
	#[error("operation cancelled")]
	Cancelled,

	/// A recoverable value can no longer be read back from its store.
	#[error("source for {key} is no longer available")]
	SourceUnavailable {
		/// Key that failed to resolve.
		key: StoreKey,
	},

	/// Content read back from a store does not match what was written.
	#[error("recovered content for {key} is corrupt: expected {expected}, got {actual}")]
	Corrupted {
		/// Key whose content was recovered.
		key: StoreKey,
		/// Fingerprint recorded when the value was written.
		expected: Fingerprint,
		/// Fingerprint of the value actually read.
		actual: Fingerprint,
	},

	/// A durable store failed for a reason other than a missing entry.
	#[error("store I/O error for {key}: {error}")]
	Io {
		/// Key being read or written.
		key: StoreKey,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The requested mutation is not allowed for this value.
	#[error("unsupported operation: {0}")]
	Unsupported(&'static str),

	/// An internal invariant was broken.
	#[error("precondition violated: {0}")]
	PreconditionViolated(String),
}

impl Error {
	/// Returns true for [`Error::Cancelled`].
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
