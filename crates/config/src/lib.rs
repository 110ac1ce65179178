//! Settings and option context for weft.
//!
//! Settings are written in TOML. Every section and field is optional:
//!
//! ```toml
//! [cache]
//! max_resident_documents = 64
//! store_capacity = 256
//!
//! [queue]
//! debounce_ms = 500
//! policy = "restart"
//!
//! [features]
//! symbol_search = true
//!
//! [scopes.rust]
//! suggest_imports = true
//! ```
//!
//! `[features]` and `[scopes.*]` seed an [`OptionContext`], the observable
//! store of boolean options that delayed services watch.

#![warn(missing_docs)]

mod error;
mod options;
mod settings;

pub use error::{ConfigError, Result};
pub use options::{OptionChange, OptionContext, SubscriptionId};
pub use settings::{CacheSettings, DebouncePolicy, QueueSettings, Settings};
