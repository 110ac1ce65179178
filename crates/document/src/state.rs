use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use weft_cache::{CellStrategy, DurableStore, LazyValueCell, VersionedSnapshot};
use weft_primitives::{CancelExt, CancellationToken, Error, Fingerprint, Fingerprinted, Result, Rope, VersionStamp};

use crate::{DocumentAttributes, DocumentId, GeneratorId, GeneratorInfo, Parser};

/// Output of a generator collaborator for one generated document.
pub struct GeneratedSource<P: Parser> {
	/// Name the generator gave this output.
	pub hint_name: String,
	/// Generated text.
	pub text: Rope,
	/// Tree the generator already parsed from `text`.
	pub tree: P::Tree,
	/// Options `tree` was parsed with.
	pub options: P::Options,
	/// The generator that produced this output.
	pub generator: GeneratorId,
}

/// Everything about a state except its content.
struct Shape<P: Parser> {
	attributes: DocumentAttributes,
	options: P::Options,
	parser: Arc<P>,
	store: Option<Arc<dyn DurableStore<Rope>>>,
	generator: Option<GeneratorInfo>,
}

/// Immutable snapshot of one document.
///
/// Text is held by a [`VersionedSnapshot`] whose cell is recoverable when the
/// state was built with a durable store and constant otherwise. The tree cell
/// is weak-only: after eviction it is re-parsed from the text snapshot.
///
/// Generated documents are read-only: [`with_text`](Self::with_text) fails
/// with [`Error::Unsupported`] and [`regenerate`](Self::regenerate) is their
/// only content update.
pub struct DocumentState<P: Parser> {
	attributes: DocumentAttributes,
	options: P::Options,
	text: Arc<VersionedSnapshot<Rope>>,
	tree: Arc<VersionedSnapshot<P::Tree>>,
	fingerprint: Fingerprint,
	generator: Option<GeneratorInfo>,
	parser: Arc<P>,
	store: Option<Arc<dyn DurableStore<Rope>>>,
}

impl<P: Parser> DocumentState<P> {
	/// Creates an editable document state.
	///
	/// With a `store`, the text is written to it and held recoverably;
	/// otherwise it is held constant. The tree is parsed on first request.
	pub fn create(
		attributes: DocumentAttributes,
		text: Rope,
		version: VersionStamp,
		options: P::Options,
		parser: Arc<P>,
		store: Option<Arc<dyn DurableStore<Rope>>>,
	) -> Result<Arc<Self>> {
		let shape = Shape {
			attributes,
			options,
			parser,
			store,
			generator: None,
		};
		Self::build(shape, text, version, None).map(Arc::new)
	}

	/// Creates a read-only state from a generator's output.
	///
	/// The generator's tree seeds the tree cell, so no parse happens until the
	/// tree is evicted.
	pub fn create_generated(
		id: DocumentId,
		source: GeneratedSource<P>,
		version: VersionStamp,
		parser: Arc<P>,
		store: Option<Arc<dyn DurableStore<Rope>>>,
	) -> Result<Arc<Self>> {
		if source.hint_name.is_empty() {
			return Err(Error::PreconditionViolated(format!("generated document {id} has an empty hint name")));
		}
		let attributes = DocumentAttributes {
			id,
			name: source.hint_name.clone(),
			path: None,
			is_generated: true,
		};
		let shape = Shape {
			attributes,
			options: source.options,
			parser,
			store,
			generator: Some(GeneratorInfo {
				hint_name: source.hint_name,
				generator: source.generator,
			}),
		};
		Self::build(shape, source.text, version, Some(source.tree)).map(Arc::new)
	}

	fn build(shape: Shape<P>, text: Rope, version: VersionStamp, seed_tree: Option<P::Tree>) -> Result<Self> {
		let fingerprint = text.fingerprint();
		let cell = match &shape.store {
			Some(store) => LazyValueCell::recoverable(text, Arc::clone(store))?,
			None => LazyValueCell::constant(text),
		};
		let text = Arc::new(VersionedSnapshot::new(cell, version));
		let tree = Arc::new(tree_snapshot(&text, &shape.parser, &shape.options, seed_tree));

		Ok(Self {
			attributes: shape.attributes,
			options: shape.options,
			text,
			tree,
			fingerprint,
			generator: shape.generator,
			parser: shape.parser,
			store: shape.store,
		})
	}

	fn shape(&self) -> Shape<P> {
		Shape {
			attributes: self.attributes.clone(),
			options: self.options.clone(),
			parser: Arc::clone(&self.parser),
			store: self.store.clone(),
			generator: self.generator.clone(),
		}
	}

	/// Same content, different attributes.
	fn with_attributes(&self, attributes: DocumentAttributes) -> Self {
		Self {
			attributes,
			options: self.options.clone(),
			text: Arc::clone(&self.text),
			tree: Arc::clone(&self.tree),
			fingerprint: self.fingerprint,
			generator: self.generator.clone(),
			parser: Arc::clone(&self.parser),
			store: self.store.clone(),
		}
	}

	/// Returns a new state holding `text` at `version`.
	///
	/// Fails with [`Error::Unsupported`] for generated documents.
	pub fn with_text(&self, text: Rope, version: VersionStamp) -> Result<Arc<Self>> {
		if self.is_generated() {
			return Err(Error::Unsupported("the contents of a generated document may not be changed"));
		}
		let next = Self::build(self.shape(), text, version, None)?;
		debug!(doc_id = %self.id(), version = version.get(), "document.with_text");
		Ok(Arc::new(next))
	}

	/// Returns a new state that parses the same text under `options`.
	///
	/// The text snapshot is shared with `self`. Fails with
	/// [`Error::Unsupported`] for generated documents.
	pub fn with_options(&self, options: P::Options) -> Result<Arc<Self>> {
		if self.is_generated() {
			return Err(Error::Unsupported("the parse options of a generated document may not be changed"));
		}
		let tree = Arc::new(tree_snapshot(&self.text, &self.parser, &options, None));
		Ok(Arc::new(Self {
			options,
			tree,
			..self.with_attributes(self.attributes.clone())
		}))
	}

	/// Returns a new state with a different name, sharing content with `self`.
	pub fn with_name(&self, name: impl Into<String>) -> Arc<Self> {
		let mut attributes = self.attributes.clone();
		attributes.name = name.into();
		Arc::new(self.with_attributes(attributes))
	}

	/// Returns a new state with a different path, sharing content with `self`.
	pub fn with_path(&self, path: Option<PathBuf>) -> Arc<Self> {
		let mut attributes = self.attributes.clone();
		attributes.path = path;
		Arc::new(self.with_attributes(attributes))
	}

	/// Replaces a generated document's content.
	///
	/// If `text` has the same fingerprint as the current text and `options`
	/// equal the current parse options, returns `self` itself so consumers
	/// holding it see no change. Otherwise builds a new generated state seeded
	/// with `tree`.
	///
	/// Cancellation before the new state is returned yields
	/// [`Error::Cancelled`] and leaves `self` untouched. Fails with
	/// [`Error::Unsupported`] for documents that were not generated.
	pub fn regenerate(
		self: &Arc<Self>,
		text: Rope,
		tree: P::Tree,
		options: P::Options,
		version: VersionStamp,
		cancel: &CancellationToken,
	) -> Result<Arc<Self>> {
		if !self.is_generated() {
			return Err(Error::Unsupported("only generated documents can be regenerated"));
		}
		cancel.check()?;

		if text.fingerprint() == self.fingerprint && options == self.options {
			debug!(doc_id = %self.id(), fingerprint = %self.fingerprint, "document.regenerate.reused");
			return Ok(Arc::clone(self));
		}

		let mut shape = self.shape();
		shape.options = options;
		// Dropping `next` on cancellation purges the text it just stored.
		let next = Self::build(shape, text, version, Some(tree))?;
		cancel.check()?;

		debug!(
			doc_id = %self.id(),
			old = %self.fingerprint,
			new = %next.fingerprint,
			version = version.get(),
			"document.regenerate.replaced"
		);
		Ok(Arc::new(next))
	}

	/// Returns the text, recovering it from the durable store if evicted.
	pub fn get_text(&self, cancel: &CancellationToken) -> Result<Arc<Rope>> {
		self.text.get(cancel)
	}

	/// Returns the tree, re-parsing it if evicted.
	pub fn get_tree(&self, cancel: &CancellationToken) -> Result<Arc<P::Tree>> {
		self.tree.get(cancel)
	}

	/// Returns the text only if it is resident.
	pub fn try_get_text(&self) -> Option<Arc<Rope>> {
		self.text.try_get_cached()
	}

	/// Returns the tree only if it is resident.
	pub fn try_get_tree(&self) -> Option<Arc<P::Tree>> {
		self.tree.try_get_cached()
	}

	/// Releases this state's hold on its text and tree.
	///
	/// Constant text is never released. Returns true if anything was released.
	pub fn evict(&self) -> bool {
		let text = self.text.evict();
		let tree = self.tree.evict();
		text || tree
	}

	/// Version of the text snapshot.
	pub fn text_version(&self) -> VersionStamp {
		self.text.version()
	}

	/// Version of the tree snapshot (the version of the text it was parsed from).
	pub fn tree_version(&self) -> VersionStamp {
		self.tree.version()
	}

	/// Text snapshot.
	pub fn text_snapshot(&self) -> &Arc<VersionedSnapshot<Rope>> {
		&self.text
	}

	/// Tree snapshot.
	pub fn tree_snapshot(&self) -> &Arc<VersionedSnapshot<P::Tree>> {
		&self.tree
	}

	/// How the text is held.
	pub fn text_strategy(&self) -> CellStrategy {
		self.text.cell().strategy()
	}

	/// Fingerprint of the text.
	pub fn fingerprint(&self) -> Fingerprint {
		self.fingerprint
	}

	/// Document identity.
	pub fn id(&self) -> DocumentId {
		self.attributes.id
	}

	/// Document metadata.
	pub fn attributes(&self) -> &DocumentAttributes {
		&self.attributes
	}

	/// Parse options for the tree.
	pub fn options(&self) -> &P::Options {
		&self.options
	}

	/// Returns true for generated (read-only) documents.
	pub fn is_generated(&self) -> bool {
		self.generator.is_some()
	}

	/// Generator metadata for generated documents.
	pub fn generator(&self) -> Option<&GeneratorInfo> {
		self.generator.as_ref()
	}

	/// Generator hint name for generated documents.
	pub fn hint_name(&self) -> Option<&str> {
		self.generator.as_ref().map(|g| g.hint_name.as_str())
	}

	/// The parser this document derives its tree with.
	pub fn parser(&self) -> &Arc<P> {
		&self.parser
	}
}

fn tree_snapshot<P: Parser>(
	text: &Arc<VersionedSnapshot<Rope>>,
	parser: &Arc<P>,
	options: &P::Options,
	seed: Option<P::Tree>,
) -> VersionedSnapshot<P::Tree> {
	let version = text.version();
	let source = Arc::clone(text);
	let parser = Arc::clone(parser);
	let options = options.clone();
	let recompute = move |cancel: &CancellationToken| {
		let text = source.get(cancel)?;
		parser.parse(&text, &options, cancel)
	};
	let cell = match seed {
		Some(tree) => LazyValueCell::weak_only_seeded(tree, recompute),
		None => LazyValueCell::weak_only(recompute),
	};
	VersionedSnapshot::new(cell, version)
}

impl<P: Parser> fmt::Debug for DocumentState<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DocumentState")
			.field("attributes", &self.attributes)
			.field("options", &self.options)
			.field("fingerprint", &self.fingerprint)
			.field("text", &self.text)
			.field("tree", &self.tree)
			.field("generator", &self.generator)
			.finish()
	}
}

#[cfg(test)]
mod tests;
