//! Error handling for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is missing or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A configured value must be an absolute URI.
    #[error("{field} must be an absolute URI, got '{value}'")]
    InvalidUri {
        /// Dotted path of the offending field.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// A referenced file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML document is malformed.
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}
