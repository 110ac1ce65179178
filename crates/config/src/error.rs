//! Error types for loading settings.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a settings file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML syntax or an unknown/mistyped key.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// A value parsed but is outside its allowed range.
	#[error("invalid value for {field}: {reason}")]
	InvalidValue {
		/// Dotted path of the offending field.
		field: String,
		/// Why it was rejected.
		reason: &'static str,
	},
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
