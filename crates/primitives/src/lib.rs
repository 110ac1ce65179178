//! Leaf types shared by every weft crate: content fingerprints, version
//! stamps, cancellation helpers, and the error taxonomy.

/// Cancellation token helpers.
pub mod cancel;
/// Error taxonomy shared by the cache, document, and worker crates.
pub mod error;
/// Content-addressed fingerprints.
pub mod fingerprint;
/// Boxed future aliases.
pub mod future;
/// Process-wide monotonic version stamps.
pub mod version;

pub use cancel::CancelExt;
pub use error::{Error, Result, StoreKey};
pub use fingerprint::{Fingerprint, Fingerprinted};
pub use future::BoxFutureStatic;
pub use ropey::Rope;
pub use tokio_util::sync::CancellationToken;
pub use version::VersionStamp;
