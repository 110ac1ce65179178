use std::fmt;

use weft_primitives::{CancellationToken, Result, Rope};

/// Front end that turns text into a tree.
///
/// Implementations must be pure and deterministic for a given text and
/// options: the cache relies on re-parsing an evicted tree producing an
/// equivalent one. Long parses should poll `cancel` and return
/// [`Error::Cancelled`](weft_primitives::Error::Cancelled) when it fires.
pub trait Parser: Send + Sync + 'static {
	/// Parsed representation.
	type Tree: Send + Sync + 'static;
	/// Options that influence parsing. Equal options must yield equal trees.
	type Options: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

	/// Parses `text` under `options`.
	fn parse(&self, text: &Rope, options: &Self::Options, cancel: &CancellationToken) -> Result<Self::Tree>;
}
