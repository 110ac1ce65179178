use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// How a batching queue's deadline reacts to new work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebouncePolicy {
	/// Every add pushes the deadline out by a full window.
	#[default]
	Restart,
	/// The first add of a batch fixes the deadline.
	Fixed,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
	/// Documents allowed to keep text and tree pinned at once.
	pub max_resident_documents: usize,
	/// Entries kept by an in-memory durable store.
	pub store_capacity: usize,
}

impl Default for CacheSettings {
	fn default() -> Self {
		Self {
			max_resident_documents: 64,
			store_capacity: 256,
		}
	}
}

/// `[queue]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSettings {
	/// Debounce window in milliseconds.
	pub debounce_ms: u64,
	/// Deadline policy.
	pub policy: DebouncePolicy,
}

impl Default for QueueSettings {
	fn default() -> Self {
		Self {
			debounce_ms: 500,
			policy: DebouncePolicy::Restart,
		}
	}
}

impl QueueSettings {
	/// Debounce window.
	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	/// Cache budgets.
	pub cache: CacheSettings,
	/// Batching queue behavior.
	pub queue: QueueSettings,
	/// Global boolean options.
	pub features: BTreeMap<String, bool>,
	/// Per-scope boolean options, keyed by scope then option.
	pub scopes: BTreeMap<String, BTreeMap<String, bool>>,
}

impl Settings {
	/// Parses settings from TOML text.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Parse`] for malformed TOML, unknown keys, or
	/// mistyped values, and [`ConfigError::InvalidValue`] for values outside
	/// their range.
	pub fn from_toml_str(input: &str) -> Result<Self> {
		let settings: Self = toml::from_str(input)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Reads and parses a settings file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let settings = Self::from_toml_str(&input)?;
		tracing::debug!(path = %path.display(), "config.load");
		Ok(settings)
	}

	/// Checks ranges serde cannot express.
	pub fn validate(&self) -> Result<()> {
		if self.cache.max_resident_documents == 0 {
			return Err(invalid("cache.max_resident_documents", "must be at least 1"));
		}
		if self.cache.store_capacity == 0 {
			return Err(invalid("cache.store_capacity", "must be at least 1"));
		}
		if self.queue.debounce_ms > 60_000 {
			return Err(invalid("queue.debounce_ms", "must not exceed 60000"));
		}
		if self.features.keys().any(String::is_empty) {
			return Err(invalid("features", "option names must not be empty"));
		}
		for (scope, options) in &self.scopes {
			if scope.is_empty() {
				return Err(invalid("scopes", "scope names must not be empty"));
			}
			if options.keys().any(String::is_empty) {
				return Err(ConfigError::InvalidValue {
					field: format!("scopes.{scope}"),
					reason: "option names must not be empty",
				});
			}
		}
		Ok(())
	}
}

fn invalid(field: &str, reason: &'static str) -> ConfigError {
	ConfigError::InvalidValue {
		field: field.to_owned(),
		reason,
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_input_yields_defaults() {
		let settings = Settings::from_toml_str("").unwrap();
		assert_eq!(settings, Settings::default());
		assert_eq!(settings.queue.debounce(), Duration::from_millis(500));
		assert_eq!(settings.cache.max_resident_documents, 64);
	}

	#[test]
	fn parses_every_section() {
		let settings = Settings::from_toml_str(
			r#"
			[cache]
			max_resident_documents = 8

			[queue]
			debounce_ms = 250
			policy = "fixed"

			[features]
			symbol_search = true

			[scopes.rust]
			suggest_imports = true
			inlay_hints = false
			"#,
		)
		.unwrap();

		let mut rust = BTreeMap::new();
		rust.insert("inlay_hints".to_owned(), false);
		rust.insert("suggest_imports".to_owned(), true);
		let expected = Settings {
			cache: CacheSettings {
				max_resident_documents: 8,
				store_capacity: 256,
			},
			queue: QueueSettings {
				debounce_ms: 250,
				policy: DebouncePolicy::Fixed,
			},
			features: BTreeMap::from([("symbol_search".to_owned(), true)]),
			scopes: BTreeMap::from([("rust".to_owned(), rust)]),
		};
		assert_eq!(settings, expected);
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let err = Settings::from_toml_str("[queue]\ndelay = 3\n").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));

		let err = Settings::from_toml_str("[telemetry]\n").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn unknown_policy_is_rejected() {
		let err = Settings::from_toml_str("[queue]\npolicy = \"sometimes\"\n").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn zero_budget_is_invalid() {
		let err = Settings::from_toml_str("[cache]\nmax_resident_documents = 0\n").unwrap_err();
		match err {
			ConfigError::InvalidValue { field, .. } => assert_eq!(field, "cache.max_resident_documents"),
			other => panic!("unexpected error: {other}"),
		}
	}

	#[test]
	fn load_reads_file_and_reports_missing_path() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("weft.toml");
		std::fs::write(&path, "[features]\nsymbol_search = false\n").unwrap();

		let settings = Settings::load(&path).unwrap();
		assert_eq!(settings.features.get("symbol_search"), Some(&false));

		let missing = dir.path().join("absent.toml");
		let err = Settings::load(&missing).unwrap_err();
		assert!(matches!(err, ConfigError::Io { path, .. } if path == missing));
	}
}
