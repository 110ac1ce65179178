use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use weft_cache::MemoryStore;
use weft_primitives::StoreKey;

use super::*;

/// Splits text into whitespace-separated tokens and counts its calls.
#[derive(Default)]
struct Tokens {
	parses: AtomicUsize,
}

impl Tokens {
	fn parses(&self) -> usize {
		self.parses.load(Ordering::SeqCst)
	}
}

impl Parser for Tokens {
	type Tree = Vec<String>;
	type Options = bool;

	fn parse(&self, text: &Rope, uppercase: &bool, cancel: &CancellationToken) -> Result<Vec<String>> {
		cancel.check()?;
		self.parses.fetch_add(1, Ordering::SeqCst);
		let text = text.to_string();
		Ok(text
			.split_whitespace()
			.map(|t| if *uppercase { t.to_uppercase() } else { t.to_owned() })
			.collect())
	}
}

fn store() -> Arc<dyn DurableStore<Rope>> {
	Arc::new(MemoryStore::<Rope>::new(32))
}

fn plain(text: &str, parser: &Arc<Tokens>, store: Option<Arc<dyn DurableStore<Rope>>>) -> Arc<DocumentState<Tokens>> {
	let attributes = DocumentAttributes::new(DocumentId::next(), "a.txt");
	DocumentState::create(
		attributes,
		Rope::from_str(text),
		VersionStamp::create(),
		false,
		Arc::clone(parser),
		store,
	)
	.unwrap()
}

fn generated(text: &str, parser: &Arc<Tokens>) -> Arc<DocumentState<Tokens>> {
	let tree = parser.parse(&Rope::from_str(text), &false, &CancellationToken::new()).unwrap();
	let source = GeneratedSource {
		hint_name: "C.g".into(),
		text: Rope::from_str(text),
		tree,
		options: false,
		generator: GeneratorId::new("gen"),
	};
	DocumentState::create_generated(DocumentId::next(), source, VersionStamp::create(), Arc::clone(parser), Some(store()))
		.unwrap()
}

#[test]
fn tree_is_parsed_lazily_once() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("a b c", &parser, None);
	let cancel = CancellationToken::new();

	assert_eq!(parser.parses(), 0);
	assert!(doc.try_get_tree().is_none());
	assert_eq!(*doc.get_tree(&cancel).unwrap(), vec!["a", "b", "c"]);
	doc.get_tree(&cancel).unwrap();
	assert_eq!(parser.parses(), 1);
	assert_eq!(doc.tree_version(), doc.text_version());
}

#[test]
fn evicted_tree_is_reparsed() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("x y", &parser, None);
	let cancel = CancellationToken::new();

	drop(doc.get_tree(&cancel).unwrap());
	assert!(doc.evict());
	assert!(doc.try_get_tree().is_none());
	assert_eq!(*doc.get_tree(&cancel).unwrap(), vec!["x", "y"]);
	assert_eq!(parser.parses(), 2);
}

#[test]
fn constant_text_survives_eviction() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("kept", &parser, None);
	assert_eq!(doc.text_strategy(), CellStrategy::Constant);
	doc.evict();
	assert_eq!(doc.try_get_text().unwrap().to_string(), "kept");
}

#[test]
fn recoverable_text_comes_back_from_store() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("class C{}", &parser, Some(store()));
	assert_eq!(doc.text_strategy(), CellStrategy::Recoverable);

	assert!(doc.evict());
	assert!(doc.try_get_text().is_none());
	let text = doc.get_text(&CancellationToken::new()).unwrap();
	assert_eq!(text.to_string(), "class C{}");
	assert_eq!(text.fingerprint(), doc.fingerprint());
}

#[test]
fn with_text_builds_new_state_with_same_identity() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("one", &parser, None);
	let v2 = VersionStamp::create();
	let next = doc.with_text(Rope::from_str("two"), v2).unwrap();

	assert_eq!(next.id(), doc.id());
	assert_eq!(next.text_version(), v2);
	assert_ne!(next.fingerprint(), doc.fingerprint());
	assert_eq!(doc.try_get_text().unwrap().to_string(), "one");
}

#[test]
fn with_options_shares_text_and_reparses() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("a b", &parser, None);
	let cancel = CancellationToken::new();
	doc.get_tree(&cancel).unwrap();

	let upper = doc.with_options(true).unwrap();
	assert!(Arc::ptr_eq(doc.text_snapshot(), upper.text_snapshot()));
	assert_eq!(*upper.get_tree(&cancel).unwrap(), vec!["A", "B"]);
	assert_eq!(parser.parses(), 2);
}

#[test]
fn rename_and_move_share_content() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("a", &parser, None);

	let renamed = doc.with_name("b.txt");
	assert_eq!(renamed.attributes().name, "b.txt");
	assert!(Arc::ptr_eq(doc.tree_snapshot(), renamed.tree_snapshot()));

	let moved = renamed.with_path(Some("/tmp/b.txt".into()));
	assert_eq!(moved.attributes().path.as_deref(), Some(std::path::Path::new("/tmp/b.txt")));
	assert_eq!(moved.attributes().name, "b.txt");
}

#[test]
fn generated_tree_is_seeded() {
	let parser = Arc::new(Tokens::default());
	let doc = generated("class C{}", &parser);
	assert_eq!(parser.parses(), 1);

	assert!(doc.is_generated());
	assert_eq!(doc.hint_name(), Some("C.g"));
	assert!(doc.try_get_tree().is_some());
	doc.get_tree(&CancellationToken::new()).unwrap();
	assert_eq!(parser.parses(), 1);
}

#[test]
fn generated_rejects_edits() {
	let parser = Arc::new(Tokens::default());
	let doc = generated("class C{}", &parser);

	assert!(matches!(
		doc.with_text(Rope::from_str("class D{}"), VersionStamp::create()),
		Err(Error::Unsupported(_))
	));
	assert!(matches!(doc.with_options(true), Err(Error::Unsupported(_))));
}

#[test]
fn regenerate_with_equal_content_returns_same_state() {
	let parser = Arc::new(Tokens::default());
	let doc = generated("class C{}", &parser);
	let again = doc
		.regenerate(
			Rope::from_str("class C{}"),
			vec!["class".into(), "C{}".into()],
			false,
			VersionStamp::create(),
			&CancellationToken::new(),
		)
		.unwrap();
	assert!(Arc::ptr_eq(&doc, &again));
}

#[test]
fn regenerate_with_new_options_replaces() {
	let parser = Arc::new(Tokens::default());
	let doc = generated("class C{}", &parser);
	let v = VersionStamp::create();
	let next = doc
		.regenerate(Rope::from_str("class C{}"), vec!["CLASS".into()], true, v, &CancellationToken::new())
		.unwrap();

	assert!(!Arc::ptr_eq(&doc, &next));
	assert_eq!(next.text_version(), v);
	assert!(*next.options());
	assert_eq!(next.generator(), doc.generator());
}

#[test]
fn regenerate_observes_cancellation() {
	let parser = Arc::new(Tokens::default());
	let doc = generated("class C{}", &parser);
	let cancel = CancellationToken::new();
	cancel.cancel();

	let result = doc.regenerate(Rope::from_str("class D{}"), Vec::new(), false, VersionStamp::create(), &cancel);
	assert!(matches!(result, Err(Error::Cancelled)));
	assert_eq!(doc.try_get_text().unwrap().to_string(), "class C{}");
}

#[test]
fn regenerate_rejects_plain_documents() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("class C{}", &parser, None);
	let result = doc.regenerate(Rope::from_str("x"), Vec::new(), false, VersionStamp::create(), &CancellationToken::new());
	assert!(matches!(result, Err(Error::Unsupported(_))));
}

#[test]
fn empty_hint_name_is_rejected() {
	let parser = Arc::new(Tokens::default());
	let source = GeneratedSource::<Tokens> {
		hint_name: String::new(),
		text: Rope::new(),
		tree: Vec::new(),
		options: false,
		generator: GeneratorId::new("gen"),
	};
	let result = DocumentState::create_generated(DocumentId::next(), source, VersionStamp::create(), parser, None);
	assert!(matches!(result, Err(Error::PreconditionViolated(_))));
}

#[test]
fn cancelled_tree_request_leaves_cell_cold() {
	let parser = Arc::new(Tokens::default());
	let doc = plain("a", &parser, None);
	let cancel = CancellationToken::new();
	cancel.cancel();

	assert!(matches!(doc.get_tree(&cancel), Err(Error::Cancelled)));
	assert!(doc.try_get_tree().is_none());
	assert_eq!(parser.parses(), 0);
}

#[test]
fn superseded_states_release_their_stored_text() {
	let parser = Arc::new(Tokens::default());
	let store = Arc::new(MemoryStore::<Rope>::new(4));
	let a = plain("alpha", &parser, Some(store.clone() as Arc<dyn DurableStore<Rope>>));
	let mut b = plain("b0", &parser, Some(store.clone() as Arc<dyn DurableStore<Rope>>));

	for i in 1..10 {
		b = b.with_text(Rope::from_str(&format!("b{i}")), VersionStamp::create()).unwrap();
	}
	assert_eq!(store.len(), 2);

	a.evict();
	assert_eq!(a.get_text(&CancellationToken::new()).unwrap().to_string(), "alpha");
	assert_eq!(b.get_text(&CancellationToken::new()).unwrap().to_string(), "b9");
}

/// Memory store that fires a token on every write once armed.
struct CancelOnWrite {
	inner: MemoryStore<Rope>,
	armed: AtomicBool,
	cancel: CancellationToken,
}

impl DurableStore<Rope> for CancelOnWrite {
	fn write(&self, key: StoreKey, value: &Rope) -> Result<()> {
		self.inner.write(key, value)?;
		if self.armed.load(Ordering::SeqCst) {
			self.cancel.cancel();
		}
		Ok(())
	}

	fn read(&self, key: StoreKey) -> Result<Rope> {
		self.inner.read(key)
	}

	fn purge(&self, key: StoreKey) -> bool {
		self.inner.purge(key)
	}
}

#[test]
fn regenerate_cancelled_after_write_leaves_no_entry() {
	let parser = Arc::new(Tokens::default());
	let cancel = CancellationToken::new();
	let store = Arc::new(CancelOnWrite {
		inner: MemoryStore::new(8),
		armed: AtomicBool::new(false),
		cancel: cancel.clone(),
	});
	let source = GeneratedSource {
		hint_name: "C.g".into(),
		text: Rope::from_str("class C{}"),
		tree: vec!["class".into(), "C{}".into()],
		options: false,
		generator: GeneratorId::new("gen"),
	};
	let doc = DocumentState::create_generated(
		DocumentId::next(),
		source,
		VersionStamp::create(),
		Arc::clone(&parser),
		Some(store.clone() as Arc<dyn DurableStore<Rope>>),
	)
	.unwrap();
	assert_eq!(store.inner.len(), 1);

	store.armed.store(true, Ordering::SeqCst);
	let result = doc.regenerate(Rope::from_str("class D{}"), Vec::new(), false, VersionStamp::create(), &cancel);

	assert!(matches!(result, Err(Error::Cancelled)));
	assert_eq!(store.inner.len(), 1);
	assert!(store.inner.contains(doc.text_snapshot().cell().store_key().unwrap()));
}
