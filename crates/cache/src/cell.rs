use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use weft_primitives::{CancelExt, CancellationToken, Error, Fingerprint, Fingerprinted, Result, StoreKey};

use crate::store::DurableStore;

/// How a [`LazyValueCell`] obtains its value after eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStrategy {
	/// Held forever; eviction is a no-op.
	Constant,
	/// Read back from a durable store by key.
	Recoverable,
	/// Re-derived from a cheaper source (e.g. a tree from its text).
	WeakOnly,
}

type Recompute<T> = Arc<dyn Fn(&CancellationToken) -> Result<T> + Send + Sync>;

enum Source<T> {
	Constant(Arc<T>),
	Recoverable {
		key: StoreKey,
		expected: Fingerprint,
		fingerprint_of: fn(&T) -> Fingerprint,
		store: Arc<dyn DurableStore<T>>,
	},
	WeakOnly(Recompute<T>),
}

/// Resident slot. `pinned` is the cell's own strong hold; `weak` tracks the
/// last value handed out so it can be reused while consumers keep it alive.
struct Slot<T> {
	pinned: Option<Arc<T>>,
	weak: Weak<T>,
}

impl<T> Slot<T> {
	fn empty() -> Self {
		Self {
			pinned: None,
			weak: Weak::new(),
		}
	}

	fn resident(value: &Arc<T>) -> Self {
		Self {
			pinned: Some(Arc::clone(value)),
			weak: Arc::downgrade(value),
		}
	}

	fn current(&self) -> Option<Arc<T>> {
		self.pinned.clone().or_else(|| self.weak.upgrade())
	}
}

/// Holder for an expensive value that can be dropped and recomputed.
///
/// Concurrent [`get`](Self::get) calls on a cold cell may each recompute, but
/// only the first finished value is installed and every caller converges on it.
/// The slot lock is never held while recomputing.
pub struct LazyValueCell<T> {
	source: Source<T>,
	slot: Mutex<Slot<T>>,
}

impl<T> LazyValueCell<T>
where
	T: Send + Sync + 'static,
{
	/// Creates a cell that always holds `value`.
	pub fn constant(value: T) -> Self {
		Self::constant_arc(Arc::new(value))
	}

	/// Creates a constant cell around an already shared value.
	pub fn constant_arc(value: Arc<T>) -> Self {
		Self {
			source: Source::Constant(value),
			slot: Mutex::new(Slot::empty()),
		}
	}

	/// Writes `value` to `store` and returns a recoverable cell for it.
	///
	/// The value starts resident. Its fingerprint is recorded so every later
	/// recovery can be checked against it. The cell owns the stored entry and
	/// purges it when dropped.
	pub fn recoverable(value: T, store: Arc<dyn DurableStore<T>>) -> Result<Self>
	where
		T: Fingerprinted,
	{
		let key = StoreKey::next();
		store.write(key, &value)?;
		let value = Arc::new(value);
		let expected = value.fingerprint();
		tracing::trace!(%key, fingerprint = %expected, "cell.recoverable.write");
		Ok(Self {
			source: Source::Recoverable {
				key,
				expected,
				fingerprint_of: <T as Fingerprinted>::fingerprint,
				store,
			},
			slot: Mutex::new(Slot::resident(&value)),
		})
	}

	/// Creates a cold cell that derives its value with `recompute` on demand.
	pub fn weak_only(recompute: impl Fn(&CancellationToken) -> Result<T> + Send + Sync + 'static) -> Self {
		Self {
			source: Source::WeakOnly(Arc::new(recompute)),
			slot: Mutex::new(Slot::empty()),
		}
	}

	/// Creates a re-derivable cell whose first value is already known.
	pub fn weak_only_seeded(value: T, recompute: impl Fn(&CancellationToken) -> Result<T> + Send + Sync + 'static) -> Self {
		let value = Arc::new(value);
		Self {
			source: Source::WeakOnly(Arc::new(recompute)),
			slot: Mutex::new(Slot::resident(&value)),
		}
	}

	/// Returns the strategy this cell was built with.
	pub fn strategy(&self) -> CellStrategy {
		match self.source {
			Source::Constant(_) => CellStrategy::Constant,
			Source::Recoverable { .. } => CellStrategy::Recoverable,
			Source::WeakOnly(_) => CellStrategy::WeakOnly,
		}
	}

	/// Returns the durable key for recoverable cells.
	pub fn store_key(&self) -> Option<StoreKey> {
		match self.source {
			Source::Recoverable { key, .. } => Some(key),
			_ => None,
		}
	}

	/// Returns the value, recomputing it synchronously if it is not resident.
	///
	/// Fails with [`Error::Cancelled`] if `cancel` fires before or during
	/// recomputation, with [`Error::SourceUnavailable`] if a recoverable key can
	/// no longer be read, and with [`Error::Corrupted`] if the recovered value
	/// does not match the fingerprint recorded at write time.
	pub fn get(&self, cancel: &CancellationToken) -> Result<Arc<T>> {
		if let Some(value) = self.try_get_cached() {
			return Ok(value);
		}

		cancel.check()?;
		let computed = match &self.source {
			Source::Constant(value) => return Ok(Arc::clone(value)),
			Source::Recoverable {
				key,
				expected,
				fingerprint_of,
				store,
			} => {
				let value = store.read(*key)?;
				let actual = fingerprint_of(&value);
				if actual != *expected {
					tracing::warn!(%key, %expected, %actual, "cell.recoverable.corrupt");
					return Err(Error::Corrupted {
						key: *key,
						expected: *expected,
						actual,
					});
				}
				tracing::trace!(%key, "cell.recoverable.read");
				value
			}
			Source::WeakOnly(recompute) => {
				let value = recompute(cancel)?;
				tracing::trace!("cell.weak_only.recompute");
				value
			}
		};
		cancel.check()?;

		let mut slot = self.slot.lock();
		if let Some(existing) = slot.current() {
			return Ok(existing);
		}
		let value = Arc::new(computed);
		*slot = Slot::resident(&value);
		Ok(value)
	}

	/// Returns the value only if it is still resident. Never recomputes.
	pub fn try_get_cached(&self) -> Option<Arc<T>> {
		match &self.source {
			Source::Constant(value) => Some(Arc::clone(value)),
			_ => self.slot.lock().current(),
		}
	}

	/// Releases the cell's own hold on its value.
	///
	/// Returns true if the cell was holding a value. Constant cells never
	/// release.
	pub fn evict(&self) -> bool {
		if matches!(self.source, Source::Constant(_)) {
			return false;
		}
		self.slot.lock().pinned.take().is_some()
	}
}

impl<T> Drop for LazyValueCell<T> {
	fn drop(&mut self) {
		if let Source::Recoverable { key, store, .. } = &self.source
			&& store.purge(*key)
		{
			tracing::trace!(%key, "cell.recoverable.purge");
		}
	}
}

impl<T> fmt::Debug for LazyValueCell<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let (strategy, resident) = match &self.source {
			Source::Constant(_) => (CellStrategy::Constant, true),
			Source::Recoverable { .. } => (CellStrategy::Recoverable, self.slot.lock().current().is_some()),
			Source::WeakOnly(_) => (CellStrategy::WeakOnly, self.slot.lock().current().is_some()),
		};
		f.debug_struct("LazyValueCell")
			.field("strategy", &strategy)
			.field("resident", &resident)
			.finish()
	}
}
