//! Build configuration handed to the compiler.
//!
//! A `BuildConfig` is created once and never mutated afterwards; the compiler
//! validates it on construction.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::entry::EntryItem;
use crate::error::{ConfigError, Result};

/// Placeholder replaced with the chunk name in output filenames.
pub const NAME_PLACEHOLDER: &str = "[name]";

/// Placeholder replaced with the compilation hash in output filenames.
pub const HASH_PLACEHOLDER: &str = "[fullhash]";

/// Name of the shared runtime chunk when `runtime_chunk` is `single`.
pub const RUNTIME_CHUNK_NAME: &str = "runtime";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
    None,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
            Mode::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryTarget {
    /// Plain script, the entry runs for its side effects
    #[default]
    Var,
    /// Universal module definition wrapper
    Umd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeChunk {
    /// Every entry chunk embeds its own runtime
    #[default]
    None,
    /// One runtime chunk shared by all entries
    Single,
}

/// Build-time plugins understood by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Plugin {
    /// Emit an `index.html` that loads the runtime and entry chunks
    HtmlShell {
        #[serde(default = "default_html_title")]
        title: String,
    },
    /// Emit hot-update manifests and include the hot runtime
    HotModuleReplacement,
}

fn default_html_title() -> String {
    "Development".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    /// Chunk filename pattern, e.g. `[name].bundle.js`
    pub filename: String,

    #[serde(default)]
    pub library_target: LibraryTarget,

    /// Absolute output directory
    pub path: PathBuf,

    /// URL prefix the output directory is served under
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// Remove stale output before each emit
    #[serde(default)]
    pub clean: bool,
}

fn default_public_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Optimization {
    #[serde(default)]
    pub runtime_chunk: RuntimeChunk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default)]
    pub mode: Mode,

    /// Source map generation; only `false` is supported in development
    #[serde(default)]
    pub devtool: bool,

    /// Entry name -> modules bundled into that entry, in order
    pub entry: IndexMap<String, Vec<EntryItem>>,

    #[serde(default)]
    pub plugins: Vec<Plugin>,

    pub output: OutputConfig,

    #[serde(default)]
    pub optimization: Optimization,
}

impl BuildConfig {
    /// Validate the configuration before a compiler is built from it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No entries are configured, or an entry has no modules
    /// - Several chunks would be written to the same filename
    /// - The output path is relative
    /// - The public path does not start with `/`
    pub fn validate(&self) -> Result<()> {
        if self.entry.is_empty() {
            return Err(ConfigError::NoEntries);
        }

        for (name, items) in &self.entry {
            if items.is_empty() {
                return Err(ConfigError::EmptyEntry(name.clone()));
            }
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ConfigError::InvalidValue {
                    field: "entry".to_string(),
                    value: name.clone(),
                    hint: "Entry names become file names and cannot contain path separators"
                        .to_string(),
                });
            }
        }

        if self.chunk_count() > 1 && !self.output.filename.contains(NAME_PLACEHOLDER) {
            return Err(ConfigError::ConflictingFilenames(
                self.output.filename.clone(),
            ));
        }

        if !self.output.path.is_absolute() {
            return Err(ConfigError::RelativeOutputPath(self.output.path.clone()));
        }

        if !self.output.public_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "output.publicPath".to_string(),
                value: self.output.public_path.clone(),
                hint: "The public path is a URL prefix such as '/' or '/assets/'".to_string(),
            });
        }

        if self.devtool {
            tracing::warn!("source maps are not generated in development builds; ignoring devtool");
        }

        Ok(())
    }

    /// Number of chunks a compilation emits.
    pub fn chunk_count(&self) -> usize {
        let runtime = usize::from(self.has_runtime_chunk());
        self.entry.len() + runtime
    }

    pub fn has_runtime_chunk(&self) -> bool {
        self.optimization.runtime_chunk == RuntimeChunk::Single
    }

    pub fn hot_enabled(&self) -> bool {
        self.plugins
            .iter()
            .any(|p| matches!(p, Plugin::HotModuleReplacement))
    }

    /// Title of the HTML shell, if the plugin is enabled.
    pub fn html_shell_title(&self) -> Option<&str> {
        self.plugins.iter().find_map(|p| match p {
            Plugin::HtmlShell { title } => Some(title.as_str()),
            _ => None,
        })
    }

    /// Output filename for a chunk.
    pub fn chunk_filename(&self, chunk: &str, hash: &str) -> String {
        self.output
            .filename
            .replace(NAME_PLACEHOLDER, chunk)
            .replace(HASH_PLACEHOLDER, hash)
    }
}
