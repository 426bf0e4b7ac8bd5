//! Entry items: application modules and the built-in hot-update client.
//!
//! Entries are written as request strings so that configuration files stay
//! readable. The hot client is addressed as `devpack/hot-client` with its
//! options encoded in a query string:
//!
//! ```
//! use devpack_config::{EntryItem, HotClientOptions};
//!
//! let item: EntryItem = "devpack/hot-client?path=/__webpack_hmr&timeout=20000&reload=true"
//!     .parse()
//!     .unwrap();
//!
//! assert_eq!(
//!     item,
//!     EntryItem::HotClient(HotClientOptions {
//!         path: "/__webpack_hmr".to_string(),
//!         timeout_ms: 20_000,
//!         reload: true,
//!     })
//! );
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Request prefix that selects the built-in hot-update client.
pub const HOT_CLIENT_REQUEST: &str = "devpack/hot-client";

/// Default event channel path shared by the hot client and the hot middleware.
pub const DEFAULT_HMR_PATH: &str = "/__webpack_hmr";

/// Default client reconnect timeout in milliseconds.
pub const DEFAULT_HMR_TIMEOUT_MS: u64 = 20_000;

/// One module bundled into an entry chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntryItem {
    /// A source module, resolved relative to the compiler context directory
    Module(String),

    /// The hot-update client, configured through its query string
    HotClient(HotClientOptions),
}

/// Options baked into the hot-update client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotClientOptions {
    /// Event channel path the client connects to
    pub path: String,

    /// Milliseconds without a message before the client reconnects
    pub timeout_ms: u64,

    /// Reload the page when an update cannot be applied
    pub reload: bool,
}

impl Default for HotClientOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_HMR_PATH.to_string(),
            timeout_ms: DEFAULT_HMR_TIMEOUT_MS,
            reload: false,
        }
    }
}

impl HotClientOptions {
    fn parse_query(query: &str) -> Result<Self, ConfigError> {
        let mut options = Self::default();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let invalid = |reason: &str| ConfigError::InvalidEntryRequest {
                request: format!("{HOT_CLIENT_REQUEST}?{query}"),
                reason: format!("{key}: {reason}"),
            };

            match key {
                "path" => {
                    if !value.starts_with('/') {
                        return Err(invalid("must start with '/'"));
                    }
                    options.path = value.to_string();
                }
                "timeout" => {
                    options.timeout_ms = value
                        .parse()
                        .map_err(|_| invalid("expected milliseconds"))?;
                }
                "reload" => {
                    options.reload = match value {
                        "true" | "" => true,
                        "false" => false,
                        _ => return Err(invalid("expected true or false")),
                    };
                }
                other => {
                    tracing::debug!("ignoring unknown hot client option '{}'", other);
                }
            }
        }

        Ok(options)
    }
}

impl fmt::Display for HotClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path={}&timeout={}&reload={}",
            self.path, self.timeout_ms, self.reload
        )
    }
}

impl EntryItem {
    /// Shorthand for a source module entry.
    pub fn module(specifier: impl Into<String>) -> Self {
        EntryItem::Module(specifier.into())
    }

    /// Whether this item is the hot-update client.
    pub fn is_hot_client(&self) -> bool {
        matches!(self, EntryItem::HotClient(_))
    }
}

impl FromStr for EntryItem {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidEntryRequest {
                request: s.to_string(),
                reason: "empty request".to_string(),
            });
        }

        match s.strip_prefix(HOT_CLIENT_REQUEST) {
            Some("") => Ok(EntryItem::HotClient(HotClientOptions::default())),
            Some(rest) if rest.starts_with('?') => {
                HotClientOptions::parse_query(&rest[1..]).map(EntryItem::HotClient)
            }
            _ => Ok(EntryItem::Module(s.to_string())),
        }
    }
}

impl TryFrom<String> for EntryItem {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntryItem> for String {
    fn from(item: EntryItem) -> Self {
        item.to_string()
    }
}

impl fmt::Display for EntryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryItem::Module(specifier) => f.write_str(specifier),
            EntryItem::HotClient(options) => write!(f, "{HOT_CLIENT_REQUEST}?{options}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module() {
        let item: EntryItem = "./app/index.js".parse().unwrap();
        assert_eq!(item, EntryItem::module("./app/index.js"));
        assert!(!item.is_hot_client());
    }

    #[test]
    fn test_hot_client_defaults_without_query() {
        let item: EntryItem = "devpack/hot-client".parse().unwrap();
        assert_eq!(item, EntryItem::HotClient(HotClientOptions::default()));
    }

    #[test]
    fn test_hot_client_renders_query() {
        let item = EntryItem::HotClient(HotClientOptions {
            path: "/__webpack_hmr".to_string(),
            timeout_ms: 20_000,
            reload: true,
        });
        assert_eq!(
            item.to_string(),
            "devpack/hot-client?path=/__webpack_hmr&timeout=20000&reload=true"
        );
    }

    #[test]
    fn test_hot_client_rejects_bad_timeout() {
        let err = "devpack/hot-client?timeout=soon"
            .parse::<EntryItem>()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_hot_client_rejects_relative_path() {
        assert!("devpack/hot-client?path=hmr".parse::<EntryItem>().is_err());
    }

    #[test]
    fn test_similar_prefix_is_a_module() {
        let item: EntryItem = "devpack/hot-client-extra".parse().unwrap();
        assert_eq!(item, EntryItem::module("devpack/hot-client-extra"));
    }

    #[test]
    fn test_empty_request_rejected() {
        assert!("  ".parse::<EntryItem>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let items: Vec<EntryItem> = serde_json::from_str(
            r#"["devpack/hot-client?reload=true", "./app/index.js"]"#,
        )
        .unwrap();
        assert!(items[0].is_hot_client());

        let json = serde_json::to_string(&items).unwrap();
        assert!(json.contains("reload=true"));
        assert!(json.contains("./app/index.js"));
    }
}
