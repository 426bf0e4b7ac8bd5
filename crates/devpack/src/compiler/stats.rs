//! Compilation statistics.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: usize,
    pub name: String,
    pub chunk: String,
}

/// Result summary of one compilation, handed to `done` subscribers.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub hash: String,
    pub time_ms: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub assets: Vec<AssetInfo>,
    pub modules: Vec<ModuleInfo>,
}

impl Stats {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
