//! File system watcher feeding the compiler's watch loop.
//!
//! Watches the compiler context recursively. Changes inside the output
//! directory, `node_modules` and hidden entries are dropped before they reach
//! the compiler, so emitting assets never triggers another compilation.

use crate::error::{DevError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Directory names ignored anywhere below the watched root.
pub const DEFAULT_IGNORED: &[&str] = &["node_modules"];

/// A relevant change below the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// Content or metadata of an existing file changed
    Modified(PathBuf),
    /// New file or directory
    Created(PathBuf),
    /// File or directory deleted
    Removed(PathBuf),
}

impl FileChange {
    /// Absolute path of the changed entry.
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// Paths the watcher drops.
#[derive(Debug, Clone)]
struct IgnoreRules {
    /// Watched root; paths outside it are dropped
    root: PathBuf,
    /// Compiler output directory
    output: PathBuf,
    /// `*.ext` suffixes or directory names
    patterns: Vec<String>,
}

impl IgnoreRules {
    fn is_ignored(&self, path: &Path) -> bool {
        if path.starts_with(&self.output) {
            return true;
        }

        let Ok(rel_path) = path.strip_prefix(&self.root) else {
            return true;
        };

        let path_str = rel_path.to_string_lossy();
        for pattern in &self.patterns {
            if let Some(ext) = pattern.strip_prefix('*') {
                if path_str.ends_with(ext) {
                    return true;
                }
            } else if rel_path
                .components()
                .any(|c| c.as_os_str() == pattern.as_str())
            {
                return true;
            }
        }

        rel_path.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        })
    }
}

/// Recursive watcher with per-path debouncing.
pub struct FileWatcher {
    /// Kept alive for as long as changes should be reported
    _watcher: RecommendedWatcher,
    /// Directory watched recursively
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root`, ignoring everything below `output`.
    ///
    /// # Errors
    ///
    /// Returns error if the root does not exist or the platform watcher
    /// cannot be created.
    pub fn new(
        root: PathBuf,
        output: PathBuf,
        ignore_patterns: Vec<String>,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(DevError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("watch root does not exist: {}", root.display()),
            )));
        }

        let (tx, rx) = mpsc::channel(100);
        let rules = IgnoreRules {
            root: root.clone(),
            output,
            patterns: ignore_patterns,
        };
        let mut last_event: Option<(PathBuf, Instant)> = None;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };

            for path in &event.paths {
                if rules.is_ignored(path) {
                    continue;
                }

                // Same file again within the window
                let now = Instant::now();
                if let Some((last_path, last_time)) = &last_event {
                    if last_path == path && now.duration_since(*last_time) < debounce {
                        continue;
                    }
                }
                last_event = Some((path.clone(), now));

                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };

                let _ = tx.blocking_send(change);
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
