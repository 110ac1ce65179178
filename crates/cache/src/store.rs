//! Durable backing stores for recoverable cells.

use weft_primitives::{Result, StoreKey};

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage a recoverable cell can read its value back from.
///
/// Content returned by [`read`](Self::read) must be fingerprint-equal to what
/// was passed to [`write`](Self::write) for the same key. Cells verify this and
/// report a mismatch as corruption.
pub trait DurableStore<T>: Send + Sync {
	/// Stores `value` under `key`, replacing any previous value.
	fn write(&self, key: StoreKey, value: &T) -> Result<()>;

	/// Reads the value stored under `key`.
	///
	/// Fails with [`Error::SourceUnavailable`](weft_primitives::Error::SourceUnavailable)
	/// if the key was never written or has been purged.
	fn read(&self, key: StoreKey) -> Result<T>;

	/// Removes the value under `key`. Returns true if something was removed.
	fn purge(&self, key: StoreKey) -> bool;
}
