//! Options for the development module and their loading.

use std::path::{Component, Path};

use figment::{
    Figment,
    providers::{Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::entry::{DEFAULT_HMR_PATH, DEFAULT_HMR_TIMEOUT_MS};
use crate::error::{ConfigError, Result};

/// Default config file looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "devpack.toml";

/// Default heartbeat interval of the hot-update channel.
pub const DEFAULT_HEARTBEAT_MS: u64 = 10_000;

/// Hot-update channel settings shared by the client and the server side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HmrOptions {
    /// Event channel path, e.g. `/__webpack_hmr`
    #[serde(default = "default_hmr_path")]
    pub path: String,

    /// Client reconnects after this long without a frame
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Reload the page when an update cannot be applied
    #[serde(default = "default_reload")]
    pub reload: bool,

    /// Server heartbeat interval
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for HmrOptions {
    fn default() -> Self {
        Self {
            path: default_hmr_path(),
            timeout_ms: default_timeout_ms(),
            reload: default_reload(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

/// Options of the development module, as read from `devpack.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevModuleOptions {
    /// Name of the application entry chunk
    #[serde(default = "default_entry_name")]
    pub entry_name: String,

    /// Application module bundled after the hot client
    #[serde(default = "default_app_entry")]
    pub app_entry: String,

    /// Title of the generated HTML shell
    #[serde(default = "default_html_title")]
    pub html_title: String,

    /// Directory under the host build directory receiving the output
    #[serde(default = "default_output_subdir")]
    pub output_subdir: String,

    /// Write emitted assets to disk in addition to memory
    #[serde(default)]
    pub write_to_disk: bool,

    /// `[hmr]` table
    #[serde(default)]
    pub hmr: HmrOptions,
}

impl Default for DevModuleOptions {
    fn default() -> Self {
        Self {
            entry_name: default_entry_name(),
            app_entry: default_app_entry(),
            html_title: default_html_title(),
            output_subdir: default_output_subdir(),
            write_to_disk: false,
            hmr: HmrOptions::default(),
        }
    }
}

impl DevModuleOptions {
    /// Load options from defaults and an optional TOML file.
    ///
    /// When `config_path` is `None`, `devpack.toml` inside `root` is used if
    /// it exists. An explicitly given path must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing, the TOML is malformed
    /// or a value fails validation.
    pub fn load(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let config_file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::Load(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = root.join(CONFIG_FILE_NAME);
                default_path.exists().then_some(default_path)
            }
        };

        if let Some(path) = config_file {
            tracing::debug!("loading dev module options from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        let options: Self = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Validate option values.
    pub fn validate(&self) -> Result<()> {
        if !self.hmr.path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "hmr.path".to_string(),
                value: self.hmr.path.clone(),
                hint: "The event channel path must start with '/'".to_string(),
            });
        }

        if self.hmr.heartbeat_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "hmr.heartbeatMs".to_string(),
                value: "0".to_string(),
                hint: "Use a positive interval such as 10000".to_string(),
            });
        }

        let subdir_is_normal = !self.output_subdir.is_empty()
            && Path::new(&self.output_subdir)
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !subdir_is_normal {
            return Err(ConfigError::InvalidValue {
                field: "outputSubdir".to_string(),
                value: self.output_subdir.clone(),
                hint: "Use a directory name inside the build directory".to_string(),
            });
        }

        Ok(())
    }
}

fn default_hmr_path() -> String {
    DEFAULT_HMR_PATH.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_HMR_TIMEOUT_MS
}

fn default_reload() -> bool {
    true
}

fn default_heartbeat_ms() -> u64 {
    DEFAULT_HEARTBEAT_MS
}

fn default_entry_name() -> String {
    "main".to_string()
}

fn default_app_entry() -> String {
    "./app/index.js".to_string()
}

fn default_html_title() -> String {
    "Development".to_string()
}

fn default_output_subdir() -> String {
    "webpack".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DevModuleOptions::default();
        assert_eq!(options.entry_name, "main");
        assert_eq!(options.app_entry, "./app/index.js");
        assert_eq!(options.output_subdir, "webpack");
        assert_eq!(options.hmr.path, "/__webpack_hmr");
        assert_eq!(options.hmr.timeout_ms, 20_000);
        assert_eq!(options.hmr.heartbeat_ms, 10_000);
        assert!(options.hmr.reload);
        assert!(!options.write_to_disk);
    }

    #[test]
    fn test_validate_rejects_relative_hmr_path() {
        let mut options = DevModuleOptions::default();
        options.hmr.path = "hmr".to_string();
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_heartbeat() {
        let mut options = DevModuleOptions::default();
        options.hmr.heartbeat_ms = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_output_subdir_outside_build_dir() {
        for subdir in ["", "..", "../webpack", "webpack/../..", "/tmp/webpack", "./webpack"] {
            let options = DevModuleOptions {
                output_subdir: subdir.to_string(),
                ..DevModuleOptions::default()
            };
            assert!(options.validate().is_err(), "{subdir:?} should be rejected");
        }

        let nested = DevModuleOptions {
            output_subdir: "dist/webpack".to_string(),
            ..DevModuleOptions::default()
        };
        assert!(nested.validate().is_ok());
    }
}
