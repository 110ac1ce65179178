use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use weft_config::{DebouncePolicy, QueueSettings};

use crate::{TaskClass, spawn};

/// Consumer of the batches a [`BatchingWorkQueue`] accumulates.
///
/// Implemented for any `Fn(Vec<T>, CancellationToken) -> impl Future<Output = ()>`.
#[async_trait]
pub trait BatchProcessor<T>: Send + Sync + 'static {
	/// Handles one batch. `cancel` fires when the queue is cancelled; the
	/// driver stops polling this future at that point.
	async fn process(&self, batch: Vec<T>, cancel: CancellationToken);
}

#[async_trait]
impl<T, F, Fut> BatchProcessor<T> for F
where
	T: Send + 'static,
	F: Fn(Vec<T>, CancellationToken) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	async fn process(&self, batch: Vec<T>, cancel: CancellationToken) {
		(self)(batch, cancel).await;
	}
}

type CoalesceEq<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Construction parameters for a [`BatchingWorkQueue`].
pub struct QueueSpec<T> {
	name: String,
	window: Duration,
	policy: DebouncePolicy,
	coalesce_eq: Option<CoalesceEq<T>>,
}

impl<T> QueueSpec<T> {
	/// Queue named `name` with a `window` debounce and the restart policy.
	pub fn new(name: impl Into<String>, window: Duration) -> Self {
		Self {
			name: name.into(),
			window,
			policy: DebouncePolicy::Restart,
			coalesce_eq: None,
		}
	}

	/// Queue configured from a `[queue]` settings section.
	pub fn from_settings(name: impl Into<String>, settings: &QueueSettings) -> Self {
		Self::new(name, settings.debounce()).policy(settings.policy)
	}

	/// Sets the debounce window.
	pub fn window(mut self, window: Duration) -> Self {
		self.window = window;
		self
	}

	/// Sets the deadline policy.
	pub fn policy(mut self, policy: DebouncePolicy) -> Self {
		self.policy = policy;
		self
	}

	/// Replaces a pending item instead of appending when `eq_fn` says the new
	/// item is equal to it.
	pub fn with_coalesce_eq(mut self, eq_fn: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
		self.coalesce_eq = Some(Arc::new(eq_fn));
		self
	}

	/// Replaces a pending item with the same key instead of appending.
	pub fn with_coalesce_key<K>(self, key_fn: impl Fn(&T) -> K + Send + Sync + 'static) -> Self
	where
		K: Eq,
	{
		self.with_coalesce_eq(move |lhs, rhs| key_fn(lhs) == key_fn(rhs))
	}
}

impl<T> Clone for QueueSpec<T> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			window: self.window,
			policy: self.policy,
			coalesce_eq: self.coalesce_eq.clone(),
		}
	}
}

impl<T> fmt::Debug for QueueSpec<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("QueueSpec")
			.field("name", &self.name)
			.field("window", &self.window)
			.field("policy", &self.policy)
			.field("coalesce", &self.coalesce_eq.is_some())
			.finish()
	}
}

struct State<T> {
	items: Vec<T>,
	deadline: Option<Instant>,
	in_flight: bool,
}

struct Shared<T> {
	name: String,
	window: Duration,
	policy: DebouncePolicy,
	coalesce_eq: Option<CoalesceEq<T>>,
	state: Mutex<State<T>>,
	/// Wakes the driver when the deadline moves.
	wake: Notify,
	/// Wakes [`BatchingWorkQueue::wait_idle`] callers after each batch.
	idle: Notify,
	cancel: CancellationToken,
}

/// Debounced accumulator with a single serialized consumer.
///
/// Items added within the debounce window of each other form one batch. When
/// the window elapses without a new add, the processor runs once with the
/// whole batch. Items added while a batch is processing start the next batch,
/// which runs only after the current one returns.
///
/// Cancelling (or dropping) the queue discards pending items and stops any
/// in-flight batch; no callback runs afterwards.
pub struct BatchingWorkQueue<T> {
	shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> BatchingWorkQueue<T> {
	/// Spawns a queue with the restart policy and no coalescing.
	pub fn new(name: impl Into<String>, window: Duration, processor: impl BatchProcessor<T>) -> Self {
		Self::spawn(QueueSpec::new(name, window), processor)
	}

	/// Spawns a queue and its driver task.
	///
	/// Outside a tokio runtime the driver runs on a shared background runtime.
	pub fn spawn(spec: QueueSpec<T>, processor: impl BatchProcessor<T>) -> Self {
		let shared = Arc::new(Shared {
			name: spec.name,
			window: spec.window,
			policy: spec.policy,
			coalesce_eq: spec.coalesce_eq,
			state: Mutex::new(State {
				items: Vec::new(),
				deadline: None,
				in_flight: false,
			}),
			wake: Notify::new(),
			idle: Notify::new(),
			cancel: CancellationToken::new(),
		});
		debug!(queue = %shared.name, window_ms = shared.window.as_millis() as u64, policy = ?shared.policy, "queue.spawn");
		spawn(TaskClass::QueueDriver, drive(Arc::clone(&shared), processor));
		Self { shared }
	}

	/// Adds `item` to the pending batch and (re)arms the debounce deadline.
	///
	/// Ignored once the queue is cancelled.
	pub fn add_work(&self, item: T) {
		let coalesce_eq = self.shared.coalesce_eq.clone();
		self.schedule(move |items| {
			if let Some(eq) = coalesce_eq
				&& let Some(slot) = items.iter_mut().find(|pending| eq(pending, &item))
			{
				*slot = item;
				return;
			}
			items.push(item);
		});
	}

	fn schedule(&self, push: impl FnOnce(&mut Vec<T>)) {
		if self.shared.cancel.is_cancelled() {
			trace!(queue = %self.shared.name, "queue.add.after_cancel");
			return;
		}
		{
			let mut state = self.shared.state.lock();
			push(&mut state.items);
			let next = Instant::now() + self.shared.window;
			match self.shared.policy {
				DebouncePolicy::Restart => state.deadline = Some(next),
				DebouncePolicy::Fixed => {
					state.deadline.get_or_insert(next);
				}
			}
			trace!(queue = %self.shared.name, pending = state.items.len(), "queue.add");
		}
		self.shared.wake.notify_one();
	}

	/// Number of items waiting for the next batch.
	pub fn pending_len(&self) -> usize {
		self.shared.state.lock().items.len()
	}

	/// Debounce window.
	pub fn window(&self) -> Duration {
		self.shared.window
	}

	/// Queue name used in trace events.
	pub fn name(&self) -> &str {
		&self.shared.name
	}

	/// Returns true once [`cancel`](Self::cancel) was called or the queue dropped.
	pub fn is_cancelled(&self) -> bool {
		self.shared.cancel.is_cancelled()
	}

	/// Discards pending work and stops the driver. Idempotent.
	pub fn cancel(&self) {
		if self.shared.cancel.is_cancelled() {
			return;
		}
		self.shared.cancel.cancel();
		let dropped = {
			let mut state = self.shared.state.lock();
			state.deadline = None;
			std::mem::take(&mut state.items).len()
		};
		self.shared.idle.notify_waiters();
		debug!(queue = %self.shared.name, dropped, "queue.cancel");
	}

	/// Resolves once nothing is pending or processing, or the queue is cancelled.
	pub async fn wait_idle(&self) {
		loop {
			let notified = self.shared.idle.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			if self.shared.cancel.is_cancelled() {
				return;
			}
			{
				let state = self.shared.state.lock();
				if state.items.is_empty() && !state.in_flight {
					return;
				}
			}

			tokio::select! {
				_ = &mut notified => {}
				_ = self.shared.cancel.cancelled() => return,
			}
		}
	}
}

impl BatchingWorkQueue<()> {
	/// Requests a run without a payload. Repeated triggers within one window
	/// produce a single one-element batch.
	pub fn trigger(&self) {
		self.schedule(|items| {
			if items.is_empty() {
				items.push(());
			}
		});
	}
}

impl<T> Drop for BatchingWorkQueue<T> {
	fn drop(&mut self) {
		self.shared.cancel.cancel();
		self.shared.idle.notify_waiters();
	}
}

impl<T> fmt::Debug for BatchingWorkQueue<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.shared.state.lock();
		f.debug_struct("BatchingWorkQueue")
			.field("name", &self.shared.name)
			.field("window", &self.shared.window)
			.field("policy", &self.shared.policy)
			.field("pending", &state.items.len())
			.field("in_flight", &state.in_flight)
			.field("cancelled", &self.shared.cancel.is_cancelled())
			.finish()
	}
}

/// Driver loop: sleeps until the deadline settles, then runs one batch.
async fn drive<T, P>(shared: Arc<Shared<T>>, processor: P)
where
	T: Send + 'static,
	P: BatchProcessor<T>,
{
	loop {
		let notified = shared.wake.notified();
		tokio::pin!(notified);
		notified.as_mut().enable();

		let deadline = shared.state.lock().deadline;
		if let Some(at) = deadline
			&& Instant::now() >= at
		{
			let batch = {
				let mut state = shared.state.lock();
				state.deadline = None;
				state.in_flight = true;
				std::mem::take(&mut state.items)
			};

			if !batch.is_empty() {
				debug!(queue = %shared.name, items = batch.len(), "queue.batch.process");
				tokio::select! {
					biased;
					_ = shared.cancel.cancelled() => break,
					_ = processor.process(batch, shared.cancel.child_token()) => {}
				}
			}

			shared.state.lock().in_flight = false;
			shared.idle.notify_waiters();
			continue;
		}

		let sleep = async move {
			match deadline {
				Some(at) => sleep_until(at).await,
				None => std::future::pending().await,
			}
		};

		tokio::select! {
			biased;
			_ = shared.cancel.cancelled() => break,
			_ = &mut notified => {}
			_ = sleep => {}
		}
	}

	shared.state.lock().in_flight = false;
	shared.idle.notify_waiters();
	trace!(queue = %shared.name, "queue.driver.exit");
}
