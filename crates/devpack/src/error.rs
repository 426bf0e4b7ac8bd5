//! Error types for the development module.
//!
//! - [`DevError`] is returned by setup, by handlers and by the dispatcher
//! - [`BuildError`] describes compilation and output problems; these are
//!   collected into build stats instead of aborting the process

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error passed through a legacy middleware continuation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum DevError {
    /// Invalid build configuration or module options
    #[error("Configuration error: {0}")]
    Config(#[from] devpack_config::ConfigError),

    /// The legacy middleware reported an error through its continuation
    #[error("Dev middleware error: {0}")]
    Middleware(#[source] BoxError),

    /// Every completion handle was dropped without resolving the request
    #[error("Request for {path} was dropped by the middleware without completing")]
    Abandoned { path: String },

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Host server errors (bind, accept)
    #[error("Server error: {0}")]
    Server(String),
}

/// Compilation errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Entry module doesn't exist
    #[error("Entry module not found: {request} (looked in {})\n\nHint: Check the entry configuration", .path.display())]
    EntryNotFound { request: String, path: PathBuf },

    /// Entry module could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output directory could not be cleaned or created
    #[error("Failed to prepare output directory {}: {source}", .path.display())]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write an emitted asset
    #[error("Failed to write asset {name}: {source}\n\nHint: Check output directory permissions")]
    AssetWriteFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using `DevError` as the default error type.
pub type Result<T, E = DevError> = std::result::Result<T, E>;

/// Convert a startup error into a miette report for the binary.
pub fn to_miette(err: DevError) -> miette::Report {
    match err {
        DevError::Config(e) => miette::miette!(
            "Configuration error: {}\n\nHint: Check {} or the command-line flags",
            e,
            devpack_config::CONFIG_FILE_NAME
        ),
        DevError::Server(msg) => miette::miette!("Server error: {}", msg),
        _ => miette::miette!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_middleware_error_keeps_source() {
        let err = DevError::Middleware(Box::new(Boom));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.downcast_ref::<Boom>().is_some());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_entry_not_found_message() {
        let err = BuildError::EntryNotFound {
            request: "./app/index.js".to_string(),
            path: PathBuf::from("/project/app/index.js"),
        };
        let msg = err.to_string();
        assert!(msg.contains("./app/index.js"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_dev_error_from_config_error() {
        let err: DevError = devpack_config::ConfigError::NoEntries.into();
        assert!(matches!(err, DevError::Config(_)));
    }

    #[test]
    fn test_output_dir_failure_names_directory() {
        let err = BuildError::OutputDirFailed {
            path: PathBuf::from("/project/.devpack/webpack"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/project/.devpack/webpack"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
