//! Debounced batching and delayed activation.
//!
//! [`BatchingWorkQueue`] accumulates items and hands them to a
//! [`BatchProcessor`] once no new work has arrived for a debounce window.
//! Batches are processed one at a time by a single driver task.
//!
//! [`DelayGate`] runs a one-shot action the first time its options say it
//! should, re-checking whenever a scope registers or an option changes.

mod batch;
mod class;
mod gate;
mod spawn;

pub use batch::{BatchProcessor, BatchingWorkQueue, QueueSpec};
pub use class::TaskClass;
pub use gate::{DelayGate, GateSpec};
pub use spawn::spawn;
pub use weft_config::DebouncePolicy;
