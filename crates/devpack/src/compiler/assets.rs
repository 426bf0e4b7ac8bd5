//! In-memory asset graph produced by a compilation.
//!
//! Maps output file names (relative to the output directory, e.g.
//! `main.bundle.js`) to their content, so assets are served without disk I/O.

use axum::body::Bytes;
use std::collections::BTreeMap;

/// One emitted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub content: Bytes,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct AssetGraph {
    files: BTreeMap<String, Asset>,
}

impl AssetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file; the content type is derived from the name.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Bytes>) {
        let name = name.into();
        let content_type = content_type_for(&name);
        self.files.insert(
            name,
            Asset {
                content: content.into(),
                content_type,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.files.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Asset)> {
        self.files.iter().map(|(name, asset)| (name.as_str(), asset))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Copy over every file of `other`, replacing same-named files.
    pub fn extend(&mut self, other: &AssetGraph) {
        for (name, asset) in &other.files {
            self.files.insert(name.clone(), asset.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Determine content type from file extension.
pub fn content_type_for(path: &str) -> &'static str {
    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension {
        "wasm" => "application/wasm",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}
