use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use weft_config::CacheSettings;
use weft_primitives::{Error, Result, StoreKey};

use super::DurableStore;

/// In-memory store bounded by entry count.
///
/// When full, a write purges the least recently used entry. Cells whose entry
/// was purged fail with `SourceUnavailable` on their next recovery.
pub struct MemoryStore<T> {
	entries: Mutex<LruCache<StoreKey, T>>,
}

impl<T> MemoryStore<T> {
	/// Creates a store holding at most `capacity` entries (minimum one).
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
		Self {
			entries: Mutex::new(LruCache::new(capacity)),
		}
	}

	/// Creates a store sized by `[cache] store_capacity`.
	pub fn from_settings(settings: &CacheSettings) -> Self {
		Self::new(settings.store_capacity)
	}

	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns true if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Maximum number of entries.
	pub fn capacity(&self) -> usize {
		self.entries.lock().cap().get()
	}

	/// Returns true if `key` is currently stored.
	pub fn contains(&self, key: StoreKey) -> bool {
		self.entries.lock().contains(&key)
	}
}

impl<T> DurableStore<T> for MemoryStore<T>
where
	T: Clone + Send,
{
	fn write(&self, key: StoreKey, value: &T) -> Result<()> {
		if let Some((purged, _)) = self.entries.lock().push(key, value.clone())
			&& purged != key
		{
			tracing::debug!(%purged, "store.memory.purge_lru");
		}
		Ok(())
	}

	fn read(&self, key: StoreKey) -> Result<T> {
		self.entries.lock().get(&key).cloned().ok_or(Error::SourceUnavailable { key })
	}

	fn purge(&self, key: StoreKey) -> bool {
		self.entries.lock().pop(&key).is_some()
	}
}

impl<T> fmt::Debug for MemoryStore<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let entries = self.entries.lock();
		f.debug_struct("MemoryStore")
			.field("len", &entries.len())
			.field("capacity", &entries.cap())
			.finish()
	}
}
