//! Error type for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while assembling a [`crate::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a TOML overlay file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a TOML overlay file.
    #[error("failed to parse config file '{path}': {source}")]
    TomlParse {
        /// Path of the file that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// An environment variable holds a value of the wrong shape for its
    /// field (e.g. `MAX_FILE_SIZE=not_a_number`).
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidEnvValue {
        /// Name of the offending environment variable.
        var: &'static str,
        /// The raw string value that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `SOURCE_ROOTS` (or its overlay equivalent) was empty.
    #[error("at least one source root must be configured")]
    NoSourceRoots,
}

impl ConfigError {
    /// Build an [`ConfigError::InvalidEnvValue`].
    pub fn invalid_env(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidEnvValue {
            var,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
