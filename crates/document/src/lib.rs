//! Immutable document snapshots.
//!
//! A [`DocumentState`] pairs a document's text with its parsed tree. The text
//! is held constant or recoverably (when a durable store is supplied), and the
//! tree is always re-derivable from the text through the [`Parser`]
//! collaborator. States are never mutated: edits return new states, and
//! regenerating a generated document with identical content returns the very
//! same `Arc`.
//!
//! [`DocumentStateManager`] is the project-level collection consumers query
//! for the current state of a document.

#![warn(missing_docs)]

mod id;
mod manager;
mod parser;
mod state;

pub use id::{DocumentAttributes, DocumentId, GeneratorId, GeneratorInfo};
pub use manager::{
	DocumentEvent, DocumentEventKind, DocumentEventReceiver, DocumentEventSender, DocumentStateManager, RegenerateOutcome,
};
pub use parser::Parser;
pub use state::{DocumentState, GeneratedSource};
