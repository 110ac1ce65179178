/// Execution classes for spawned worker tasks, used in trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Long-lived loop that drains a batching queue.
	QueueDriver,
	/// One-shot work released by an activation gate.
	DeferredAction,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::QueueDriver => "queue_driver",
			Self::DeferredAction => "deferred_action",
		}
	}
}
