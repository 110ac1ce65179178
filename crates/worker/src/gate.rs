use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use weft_config::{OptionContext, QueueSettings, SubscriptionId};
use weft_primitives::BoxFutureStatic;

use crate::{BatchingWorkQueue, QueueSpec, TaskClass, spawn};

type Action = Box<dyn FnOnce(CancellationToken) -> BoxFutureStatic<()> + Send>;

/// Which options open a [`DelayGate`].
#[derive(Debug, Clone)]
pub struct GateSpec {
	name: String,
	global_key: String,
	scope_keys: Vec<String>,
	queue: QueueSpec<()>,
}

impl GateSpec {
	/// Gate that opens when `global_key` is set and a registered scope has one
	/// of `scope_keys` set. Re-evaluations are debounced over 500 ms.
	pub fn new(name: impl Into<String>, global_key: impl Into<String>, scope_keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
		let name = name.into();
		Self {
			queue: QueueSpec::new(format!("{name}.gate"), Duration::from_millis(500)),
			name,
			global_key: global_key.into(),
			scope_keys: scope_keys.into_iter().map(Into::into).collect(),
		}
	}

	/// Uses `settings` for the re-evaluation queue.
	pub fn queue_settings(mut self, settings: &QueueSettings) -> Self {
		self.queue = QueueSpec::from_settings(format!("{}.gate", self.name), settings);
		self
	}

	/// Overrides the re-evaluation debounce window, keeping the policy.
	pub fn window(mut self, window: Duration) -> Self {
		self.queue = self.queue.window(window);
		self
	}
}

struct Inner {
	name: String,
	global_key: String,
	scope_keys: Vec<String>,
	options: Arc<OptionContext>,
	scopes: Mutex<FxHashSet<String>>,
	activated: AtomicBool,
	activated_tx: watch::Sender<bool>,
	subscription: Mutex<Option<SubscriptionId>>,
	action: Mutex<Option<Action>>,
	cancel: CancellationToken,
	queue: BatchingWorkQueue<()>,
}

/// One-shot activation of an expensive service once its options allow it.
///
/// The gate opens when the global option is set and at least one registered
/// scope has at least one of the per-scope options set. Requests to
/// re-evaluate (scope registrations, option changes, explicit calls) are
/// debounced through a [`BatchingWorkQueue`], so a burst of changes costs one
/// evaluation. When the gate opens it stops listening to the option context
/// and runs the action on its own task, exactly once.
pub struct DelayGate {
	inner: Arc<Inner>,
}

impl DelayGate {
	/// Creates the gate and subscribes it to `options`.
	///
	/// Nothing is evaluated until a scope registers, an option changes, or
	/// [`on_external_condition_changed`](Self::on_external_condition_changed)
	/// is called.
	pub fn new<F, Fut>(spec: GateSpec, options: Arc<OptionContext>, action: F) -> Self
	where
		F: FnOnce(CancellationToken) -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let action: Action = Box::new(move |cancel| Box::pin(action(cancel)));
		let (activated_tx, _) = watch::channel(false);

		let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
			let evaluator = weak.clone();
			let processor = move |_batch: Vec<()>, _cancel: CancellationToken| {
				let evaluator = evaluator.clone();
				async move {
					if let Some(inner) = evaluator.upgrade() {
						inner.evaluate();
					}
				}
			};
			Inner {
				name: spec.name,
				global_key: spec.global_key,
				scope_keys: spec.scope_keys,
				options: Arc::clone(&options),
				scopes: Mutex::new(FxHashSet::default()),
				activated: AtomicBool::new(false),
				activated_tx,
				subscription: Mutex::new(None),
				action: Mutex::new(Some(action)),
				cancel: CancellationToken::new(),
				queue: BatchingWorkQueue::spawn(spec.queue, processor),
			}
		});

		let listener = Arc::downgrade(&inner);
		let id = options.subscribe(move |change| {
			if let Some(inner) = listener.upgrade() {
				trace!(gate = %inner.name, key = %change.key, "gate.option_changed");
				inner.queue.trigger();
			}
		});
		*inner.subscription.lock() = Some(id);

		Self { inner }
	}

	/// Adds `scope` to the set the per-scope options are checked in and
	/// schedules a re-evaluation. Registering a known scope again only
	/// schedules the re-evaluation.
	pub fn register_scope(&self, scope: impl Into<String>) {
		let scope = scope.into();
		if self.inner.scopes.lock().insert(scope.clone()) {
			debug!(gate = %self.inner.name, %scope, "gate.scope.register");
		}
		self.on_external_condition_changed();
	}

	/// Schedules a re-evaluation. No-op once activated.
	pub fn on_external_condition_changed(&self) {
		if self.is_activated() {
			return;
		}
		self.inner.queue.trigger();
	}

	/// Returns true once the action has been released.
	pub fn is_activated(&self) -> bool {
		self.inner.activated.load(Ordering::Acquire)
	}

	/// Resolves when the gate activates. Never resolves for a gate that is
	/// shut down before activating.
	pub async fn activated(&self) {
		let mut rx = self.inner.activated_tx.subscribe();
		let _ = rx.wait_for(|activated| *activated).await;
	}

	/// Registered scopes, sorted.
	pub fn scopes(&self) -> Vec<String> {
		let mut scopes: Vec<_> = self.inner.scopes.lock().iter().cloned().collect();
		scopes.sort_unstable();
		scopes
	}

	/// Gate name used in trace events.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Stops evaluating, drops the action if it has not run, and cancels it if
	/// it is running. Idempotent.
	pub fn shutdown(&self) {
		self.inner.unsubscribe();
		self.inner.queue.cancel();
		self.inner.cancel.cancel();
		self.inner.action.lock().take();
		debug!(gate = %self.inner.name, "gate.shutdown");
	}
}

impl Inner {
	fn evaluate(&self) {
		if self.activated.load(Ordering::Acquire) {
			return;
		}
		if !self.options.get_global(&self.global_key) {
			trace!(gate = %self.name, key = %self.global_key, "gate.blocked.global");
			return;
		}
		let ready_scope = {
			let scopes = self.scopes.lock();
			scopes
				.iter()
				.find(|scope| self.scope_keys.iter().any(|key| self.options.get_scoped(scope, key)))
				.cloned()
		};
		let Some(scope) = ready_scope else {
			trace!(gate = %self.name, "gate.blocked.scopes");
			return;
		};
		if self
			.activated
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return;
		}

		self.unsubscribe();
		self.activated_tx.send_replace(true);
		info!(gate = %self.name, %scope, "gate.activated");

		if let Some(action) = self.action.lock().take() {
			let cancel = self.cancel.child_token();
			let run = action(cancel.clone());
			spawn(TaskClass::DeferredAction, async move {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => {}
					_ = run => {}
				}
			});
		}
	}

	fn unsubscribe(&self) {
		if let Some(id) = self.subscription.lock().take() {
			self.options.unsubscribe(id);
		}
	}
}

impl Drop for DelayGate {
	fn drop(&mut self) {
		self.inner.unsubscribe();
		self.inner.queue.cancel();
	}
}

impl fmt::Debug for DelayGate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DelayGate")
			.field("name", &self.inner.name)
			.field("global_key", &self.inner.global_key)
			.field("scope_keys", &self.inner.scope_keys)
			.field("scopes", &self.scopes())
			.field("activated", &self.is_activated())
			.finish()
	}
}

#[cfg(test)]
mod tests;
