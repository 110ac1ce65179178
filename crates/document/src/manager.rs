//! Project-level collection of document states.
//!
//! The manager owns the current [`DocumentState`] per [`DocumentId`] and the
//! residency budget: at most `max_resident` documents keep their text and tree
//! pinned; touching one more evicts the least recently used.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use weft_config::CacheSettings;
use weft_primitives::{CancellationToken, Error, Result, Rope, VersionStamp};

use crate::{DocumentId, DocumentState, GeneratedSource, Parser};

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEventKind {
	/// First state for this id.
	Added,
	/// A new state replaced the previous one.
	Replaced,
	/// Regeneration produced identical content; the previous state was kept.
	Reused,
	/// The document was removed.
	Removed,
}

/// Change notification for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
	/// Affected document.
	pub id: DocumentId,
	/// What happened.
	pub kind: DocumentEventKind,
	/// Text version of the state the document now has (or had, for removals).
	pub version: VersionStamp,
}

/// Sender for document events.
pub type DocumentEventSender = mpsc::UnboundedSender<DocumentEvent>;

/// Receiver for document events.
pub type DocumentEventReceiver = mpsc::UnboundedReceiver<DocumentEvent>;

/// Result of [`DocumentStateManager::update_generated`].
#[derive(Debug)]
pub enum RegenerateOutcome<P: Parser> {
	/// Content was unchanged; this is the state that was already installed.
	Reused(Arc<DocumentState<P>>),
	/// A new state was installed.
	Replaced(Arc<DocumentState<P>>),
	/// The new output was older than a state installed concurrently; that
	/// newer state was kept and the output discarded.
	Superseded(Arc<DocumentState<P>>),
}

impl<P: Parser> RegenerateOutcome<P> {
	/// The state now installed.
	pub fn state(&self) -> &Arc<DocumentState<P>> {
		match self {
			Self::Reused(state) | Self::Replaced(state) | Self::Superseded(state) => state,
		}
	}

	/// Returns true if the previous state was kept.
	pub fn is_reused(&self) -> bool {
		matches!(self, Self::Reused(_))
	}

	/// Returns true if this call's output became the installed state.
	pub fn is_installed(&self) -> bool {
		matches!(self, Self::Replaced(_))
	}
}

/// Manager for the current state of every document in a project.
pub struct DocumentStateManager<P: Parser> {
	documents: RwLock<FxHashMap<DocumentId, Arc<DocumentState<P>>>>,
	/// Most recently touched documents. Lock order: never held while
	/// `documents` is locked.
	resident: Mutex<LruCache<DocumentId, ()>>,
	event_sender: Option<DocumentEventSender>,
	/// Bumped on every installed change.
	generation: AtomicU64,
}

impl<P: Parser> std::fmt::Debug for DocumentStateManager<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentStateManager")
			.field("documents", &self.documents.read().len())
			.field("resident", &self.resident.lock().len())
			.field("has_event_sender", &self.event_sender.is_some())
			.field("generation", &self.generation)
			.finish()
	}
}

impl<P: Parser> DocumentStateManager<P> {
	/// Creates an empty manager keeping at most `max_resident` documents pinned.
	///
	/// A budget of zero is treated as one.
	pub fn new(max_resident: usize) -> Self {
		Self::build(max_resident, None)
	}

	/// Creates a manager whose budget is `[cache] max_resident_documents`.
	pub fn from_settings(settings: &CacheSettings) -> Self {
		Self::new(settings.max_resident_documents)
	}

	/// Creates a manager with an event channel.
	pub fn with_events(max_resident: usize) -> (Self, DocumentEventReceiver) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Self::build(max_resident, Some(sender)), receiver)
	}

	fn build(max_resident: usize, event_sender: Option<DocumentEventSender>) -> Self {
		let cap = NonZeroUsize::new(max_resident).unwrap_or(NonZeroUsize::MIN);
		Self {
			documents: RwLock::new(FxHashMap::default()),
			resident: Mutex::new(LruCache::new(cap)),
			event_sender,
			generation: AtomicU64::new(0),
		}
	}

	/// Counter that increases whenever an installed state changes.
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	/// Number of managed documents.
	pub fn len(&self) -> usize {
		self.documents.read().len()
	}

	/// Returns true if no documents are managed.
	pub fn is_empty(&self) -> bool {
		self.documents.read().is_empty()
	}

	/// Ids of all managed documents, in ascending order.
	pub fn ids(&self) -> Vec<DocumentId> {
		let mut ids: Vec<_> = self.documents.read().keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	/// Returns true if `id` is managed.
	pub fn contains(&self, id: DocumentId) -> bool {
		self.documents.read().contains_key(&id)
	}

	/// Number of documents currently counted against the residency budget.
	pub fn resident_len(&self) -> usize {
		self.resident.lock().len()
	}

	/// Current state of `id`. Marks the document as recently used.
	pub fn get(&self, id: DocumentId) -> Option<Arc<DocumentState<P>>> {
		let state = self.documents.read().get(&id).cloned()?;
		self.touch(id);
		Some(state)
	}

	/// Current state of `id` without affecting residency.
	pub fn peek(&self, id: DocumentId) -> Option<Arc<DocumentState<P>>> {
		self.documents.read().get(&id).cloned()
	}

	/// Installs `state` as the current state of its document.
	///
	/// Returns the previous state, if any.
	pub fn insert(&self, state: Arc<DocumentState<P>>) -> Option<Arc<DocumentState<P>>> {
		let id = state.id();
		let version = state.text_version();
		let previous = self.documents.write().insert(id, state);
		let kind = if previous.is_some() {
			DocumentEventKind::Replaced
		} else {
			DocumentEventKind::Added
		};
		self.installed(id, kind, version);
		previous
	}

	/// Removes `id`, returning its last state.
	pub fn remove(&self, id: DocumentId) -> Option<Arc<DocumentState<P>>> {
		let removed = self.documents.write().remove(&id)?;
		self.resident.lock().pop(&id);
		self.installed(id, DocumentEventKind::Removed, removed.text_version());
		Some(removed)
	}

	/// Replaces the text of an editable document.
	///
	/// If another update installed a newer version while this one was being
	/// built, the newer state is kept and returned. Fails with
	/// [`Error::PreconditionViolated`] for unknown ids and with
	/// [`Error::Unsupported`] for generated documents.
	pub fn update_text(&self, id: DocumentId, text: Rope, version: VersionStamp) -> Result<Arc<DocumentState<P>>> {
		let current = self.require(id)?;
		let next = current.with_text(text, version)?;
		Ok(self.install_newest(next).0)
	}

	/// Feeds a generator's new output for `id` through
	/// [`DocumentState::regenerate`].
	///
	/// Unchanged output keeps the installed state (and its `Arc` identity) and
	/// emits [`DocumentEventKind::Reused`]. Output from a different generator
	/// or under a different hint name is rejected with
	/// [`Error::PreconditionViolated`].
	pub fn update_generated(
		&self,
		id: DocumentId,
		source: GeneratedSource<P>,
		version: VersionStamp,
		cancel: &CancellationToken,
	) -> Result<RegenerateOutcome<P>> {
		let current = self.require(id)?;
		if let Some(info) = current.generator()
			&& (info.generator != source.generator || info.hint_name != source.hint_name)
		{
			return Err(Error::PreconditionViolated(format!(
				"{id} was produced by {}/{}, not {}/{}",
				info.generator.0, info.hint_name, source.generator.0, source.hint_name
			)));
		}
		let next = current.regenerate(source.text, source.tree, source.options, version, cancel)?;

		if Arc::ptr_eq(&current, &next) {
			self.touch(id);
			self.emit(id, DocumentEventKind::Reused, next.text_version());
			return Ok(RegenerateOutcome::Reused(next));
		}
		Ok(match self.install_newest(next) {
			(state, true) => RegenerateOutcome::Replaced(state),
			(state, false) => RegenerateOutcome::Superseded(state),
		})
	}

	/// Evicts every managed document's resident values.
	///
	/// Returns the number of documents that released something.
	pub fn evict_all(&self) -> usize {
		self.resident.lock().clear();
		let documents = self.documents.read();
		documents.values().filter(|state| state.evict()).count()
	}

	fn require(&self, id: DocumentId) -> Result<Arc<DocumentState<P>>> {
		self.peek(id)
			.ok_or_else(|| Error::PreconditionViolated(format!("{id} is not managed")))
	}

	/// Installs `next` unless the installed state is already newer.
	///
	/// Returns the state left installed and whether it is `next`.
	fn install_newest(&self, next: Arc<DocumentState<P>>) -> (Arc<DocumentState<P>>, bool) {
		let id = next.id();
		let version = next.text_version();
		{
			let mut documents = self.documents.write();
			if let Some(existing) = documents.get(&id)
				&& existing.text_version().is_newer_than(version)
			{
				debug!(doc_id = %id, stale = version.get(), current = existing.text_version().get(), "document.update.stale");
				return (Arc::clone(existing), false);
			}
			documents.insert(id, Arc::clone(&next));
		}
		self.installed(id, DocumentEventKind::Replaced, version);
		(next, true)
	}

	fn installed(&self, id: DocumentId, kind: DocumentEventKind, version: VersionStamp) {
		self.generation.fetch_add(1, Ordering::AcqRel);
		if kind != DocumentEventKind::Removed {
			self.touch(id);
		}
		self.emit(id, kind, version);
	}

	fn emit(&self, id: DocumentId, kind: DocumentEventKind, version: VersionStamp) {
		trace!(doc_id = %id, ?kind, version = version.get(), "document.event");
		if let Some(ref sender) = self.event_sender {
			let _ = sender.send(DocumentEvent { id, kind, version });
		}
	}

	/// Marks `id` as recently used and evicts whatever falls out of the budget.
	fn touch(&self, id: DocumentId) {
		let pushed_out = match self.resident.lock().push(id, ()) {
			Some((old, ())) if old != id => old,
			_ => return,
		};
		let state = self.documents.read().get(&pushed_out).cloned();
		if let Some(state) = state
			&& state.evict()
		{
			debug!(doc_id = %pushed_out, "document.evict");
		}
	}
}
