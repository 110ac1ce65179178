//! Memory-reclaimable value cells.
//!
//! A [`LazyValueCell`] holds an expensive value under one of three strategies
//! (constant, recoverable from a [`DurableStore`], or re-derivable from a
//! cheaper source). A [`VersionedSnapshot`] pairs such a cell with the
//! [`VersionStamp`](weft_primitives::VersionStamp) of the content it holds.
//!
//! # Eviction
//!
//! Eviction is explicit. A cell keeps its value resident until its owner calls
//! [`LazyValueCell::evict`]. After eviction the value remains reachable only
//! while some consumer still holds an `Arc` to it; the next
//! [`LazyValueCell::get`] after the last holder lets go recomputes it.

#![warn(missing_docs)]

mod cell;
mod snapshot;
pub mod store;

pub use cell::{CellStrategy, LazyValueCell};
pub use snapshot::VersionedSnapshot;
pub use store::{DurableStore, FileStore, MemoryStore};
