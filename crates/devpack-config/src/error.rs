//! Error types for build configuration validation and option loading.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no entries specified")]
    NoEntries,

    #[error("entry '{0}' has no modules")]
    EmptyEntry(String),

    #[error("invalid entry request '{request}': {reason}")]
    InvalidEntryRequest { request: String, reason: String },

    #[error(
        "output filename '{0}' must contain [name] when more than one chunk is emitted\n\nHint: use a pattern such as '[name].bundle.js'"
    )]
    ConflictingFilenames(String),

    #[error("output path must be absolute: {}", .0.display())]
    RelativeOutputPath(PathBuf),

    #[error("invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        field: String,
        value: String,
        hint: String,
    },

    #[error("failed to load options: {0}")]
    Load(String),
}
