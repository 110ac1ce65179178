use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::Settings;

/// Handle returned by [`OptionContext::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A single option value that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionChange {
	/// `None` for global options.
	pub scope: Option<String>,
	/// Option name.
	pub key: String,
	/// New value.
	pub value: bool,
}

type Listener = Arc<dyn Fn(&OptionChange) + Send + Sync>;

#[derive(Default)]
struct Values {
	global: FxHashMap<String, bool>,
	scoped: FxHashMap<String, FxHashMap<String, bool>>,
}

/// Observable store of boolean options.
///
/// Options are either global or attached to a scope (e.g. a language or a
/// project). Unset options read as `false`. Listeners run synchronously on the
/// thread that made the change, after the value is stored and with no lock
/// held, so a listener may read options or unsubscribe itself.
#[derive(Default)]
pub struct OptionContext {
	values: RwLock<Values>,
	listeners: Mutex<FxHashMap<SubscriptionId, Listener>>,
	next_id: AtomicU64,
}

impl fmt::Debug for OptionContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let values = self.values.read();
		f.debug_struct("OptionContext")
			.field("global", &values.global)
			.field("scoped", &values.scoped)
			.field("listeners", &self.listeners.lock().len())
			.finish()
	}
}

impl OptionContext {
	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a context seeded from `[features]` and `[scopes.*]`.
	pub fn from_settings(settings: &Settings) -> Self {
		let global = settings.features.iter().map(|(k, v)| (k.clone(), *v)).collect();
		let scoped = settings
			.scopes
			.iter()
			.map(|(scope, options)| (scope.clone(), options.iter().map(|(k, v)| (k.clone(), *v)).collect()))
			.collect();
		Self {
			values: RwLock::new(Values { global, scoped }),
			..Self::default()
		}
	}

	/// Value of a global option.
	pub fn get_global(&self, key: &str) -> bool {
		self.values.read().global.get(key).copied().unwrap_or(false)
	}

	/// Value of an option in `scope`.
	pub fn get_scoped(&self, scope: &str, key: &str) -> bool {
		self.values
			.read()
			.scoped
			.get(scope)
			.and_then(|options| options.get(key))
			.copied()
			.unwrap_or(false)
	}

	/// Sets a global option. Returns true if the value read back changed.
	pub fn set_global(&self, key: &str, value: bool) -> bool {
		let changed = {
			let mut values = self.values.write();
			values.global.insert(key.to_owned(), value).unwrap_or(false) != value
		};
		if changed {
			self.notify(OptionChange {
				scope: None,
				key: key.to_owned(),
				value,
			});
		}
		changed
	}

	/// Sets an option in `scope`. Returns true if the value changed.
	pub fn set_scoped(&self, scope: &str, key: &str, value: bool) -> bool {
		let changed = {
			let mut values = self.values.write();
			let options = values.scoped.entry(scope.to_owned()).or_default();
			options.insert(key.to_owned(), value).unwrap_or(false) != value
		};
		if changed {
			self.notify(OptionChange {
				scope: Some(scope.to_owned()),
				key: key.to_owned(),
				value,
			});
		}
		changed
	}

	/// Registers `listener` to run after every option change.
	pub fn subscribe(&self, listener: impl Fn(&OptionChange) + Send + Sync + 'static) -> SubscriptionId {
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
		self.listeners.lock().insert(id, Arc::new(listener));
		id
	}

	/// Removes a listener. Returns false if it was already gone.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.listeners.lock().remove(&id).is_some()
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.listeners.lock().len()
	}

	fn notify(&self, change: OptionChange) {
		let listeners: Vec<Listener> = self.listeners.lock().values().cloned().collect();
		tracing::trace!(scope = ?change.scope, key = %change.key, value = change.value, listeners = listeners.len(), "config.option.changed");
		for listener in listeners {
			listener(&change);
		}
	}
}
