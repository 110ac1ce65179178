use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique document IDs.
static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl DocumentId {
	/// Generates a new unique document ID.
	pub fn next() -> Self {
		Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for DocumentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "doc#{}", self.0)
	}
}

/// Identity of the generator that produced a generated document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratorId(pub String);

impl GeneratorId {
	/// Creates a generator id from a name.
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}
}

/// Where a generated document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorInfo {
	/// Name the generator gave this output (unique per generator).
	pub hint_name: String,
	/// The generator that produced it.
	pub generator: GeneratorId,
}

/// Descriptive metadata carried by every document state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAttributes {
	/// Document identity, stable across edits.
	pub id: DocumentId,
	/// Display name.
	pub name: String,
	/// File path, if the document is backed by one.
	pub path: Option<PathBuf>,
	/// Whether the content was produced by a generator.
	pub is_generated: bool,
}

impl DocumentAttributes {
	/// Attributes for an ordinary (editable) document.
	pub fn new(id: DocumentId, name: impl Into<String>) -> Self {
		Self {
			id,
			name: name.into(),
			path: None,
			is_generated: false,
		}
	}

	/// Sets the file path.
	pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.path = Some(path.into());
		self
	}
}
