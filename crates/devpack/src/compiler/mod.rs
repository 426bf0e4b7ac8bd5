//! Development compiler.
//!
//! A [`Compiler`] owns one build configuration and the result of its latest
//! compilation. Subscribers register on [`Hooks`]: `invalid` fires when a
//! watched file changes, `done` after every compilation with its [`Stats`].

pub mod assets;
mod compilation;
pub mod stats;
pub mod watcher;

pub use assets::{Asset, AssetGraph};
pub use stats::Stats;

use crate::error::{BuildError, Result};
use compilation::PreviousBuild;
use devpack_config::BuildConfig;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use watcher::{DEFAULT_IGNORED, FileWatcher};

type InvalidHook = Arc<dyn Fn(Option<&Path>) + Send + Sync>;
type DoneHook = Arc<dyn Fn(&Arc<Stats>) + Send + Sync>;

/// Synchronous compiler hooks.
///
/// Subscribers are called outside the registration lock, so a subscriber may
/// register further subscribers.
#[derive(Default)]
pub struct Hooks {
    invalid: RwLock<Vec<InvalidHook>>,
    done: RwLock<Vec<DoneHook>>,
}

impl Hooks {
    pub fn on_invalid(&self, hook: impl Fn(Option<&Path>) + Send + Sync + 'static) {
        self.invalid.write().push(Arc::new(hook));
    }

    pub fn on_done(&self, hook: impl Fn(&Arc<Stats>) + Send + Sync + 'static) {
        self.done.write().push(Arc::new(hook));
    }

    fn call_invalid(&self, path: Option<&Path>) {
        let hooks = self.invalid.read().clone();
        for hook in hooks {
            hook(path);
        }
    }

    fn call_done(&self, stats: &Arc<Stats>) {
        let hooks = self.done.read().clone();
        for hook in hooks {
            hook(stats);
        }
    }
}

/// Watch mode settings.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Delay after the first change before recompiling; changes arriving in
    /// the meantime are folded into the same compilation
    pub aggregate_timeout: Duration,

    /// Extra ignore patterns (`*.ext` or a directory name)
    pub ignored: Vec<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            aggregate_timeout: Duration::from_millis(20),
            ignored: DEFAULT_IGNORED.iter().map(|p| p.to_string()).collect(),
        }
    }
}

struct CompilerInner {
    config: BuildConfig,
    context: PathBuf,
    hooks: Hooks,
    assets: RwLock<Arc<AssetGraph>>,
    stats: RwLock<Option<Arc<Stats>>>,
    previous: Mutex<Option<PreviousBuild>>,
    build_lock: tokio::sync::Mutex<()>,
    write_to_disk: AtomicBool,
}

/// Shared handle to one compiler.
#[derive(Clone)]
pub struct Compiler {
    inner: Arc<CompilerInner>,
}

impl Compiler {
    /// Create a compiler resolving entry modules against `context`.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(config: BuildConfig, context: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(CompilerInner {
                config,
                context: context.into(),
                hooks: Hooks::default(),
                assets: RwLock::new(Arc::new(AssetGraph::new())),
                stats: RwLock::new(None),
                previous: Mutex::new(None),
                build_lock: tokio::sync::Mutex::new(()),
                write_to_disk: AtomicBool::new(false),
            }),
        })
    }

    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    pub fn config(&self) -> &BuildConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &Path {
        &self.inner.context
    }

    pub fn output_path(&self) -> &Path {
        &self.inner.config.output.path
    }

    /// Latest emitted assets.
    pub fn assets(&self) -> Arc<AssetGraph> {
        self.inner.assets.read().clone()
    }

    /// Stats of the latest compilation, if one finished.
    pub fn stats(&self) -> Option<Arc<Stats>> {
        self.inner.stats.read().clone()
    }

    /// Also write emitted assets to the output directory.
    pub fn set_write_to_disk(&self, enabled: bool) {
        self.inner.write_to_disk.store(enabled, Ordering::SeqCst);
    }

    /// Tell subscribers that the current output is stale.
    pub fn invalidate(&self, changed: Option<&Path>) {
        self.inner.hooks.call_invalid(changed);
    }

    /// Compile once and notify `done` subscribers.
    ///
    /// Compilations are serialized. Module errors and output write failures
    /// are reported in the returned stats; `done` fires either way.
    pub async fn run(&self) -> Arc<Stats> {
        let inner = &self.inner;
        let _build = inner.build_lock.lock().await;

        let previous = inner.previous.lock().clone();
        let output = compilation::compile(&inner.config, &inner.context, previous.as_ref()).await;
        let mut stats = output.stats;

        if inner.write_to_disk.load(Ordering::SeqCst) {
            if let Err(e) = self.emit(&output.assets).await {
                stats.errors.push(e.to_string());
            }
        }

        {
            let mut assets = inner.assets.write();
            if inner.config.output.clean {
                *assets = Arc::new(output.assets);
            } else {
                let mut merged = AssetGraph::clone(&assets);
                merged.extend(&output.assets);
                *assets = Arc::new(merged);
            }
        }
        *inner.previous.lock() = Some(output.build);

        let stats = Arc::new(stats);
        *inner.stats.write() = Some(Arc::clone(&stats));

        for error in &stats.errors {
            tracing::error!("{}", error);
        }
        tracing::debug!(
            "compiled {} assets in {}ms (hash {})",
            stats.assets.len(),
            stats.time_ms,
            stats.hash
        );

        inner.hooks.call_done(&stats);
        stats
    }

    async fn emit(&self, assets: &AssetGraph) -> Result<(), BuildError> {
        let out = self.output_path();
        let output_dir_failed = |source| BuildError::OutputDirFailed {
            path: out.to_path_buf(),
            source,
        };

        if self.inner.config.output.clean
            && tokio::fs::try_exists(out).await.map_err(output_dir_failed)?
        {
            tokio::fs::remove_dir_all(out)
                .await
                .map_err(output_dir_failed)?;
        }
        tokio::fs::create_dir_all(out)
            .await
            .map_err(output_dir_failed)?;

        for (name, asset) in assets.iter() {
            tokio::fs::write(out.join(name), &asset.content)
                .await
                .map_err(|source| BuildError::AssetWriteFailed {
                    name: name.to_string(),
                    source,
                })?;
        }

        Ok(())
    }

    /// Compile now and again whenever a watched file changes.
    ///
    /// Must be called from within a Tokio runtime. If the file watcher cannot
    /// be started, only the initial compilation runs.
    pub fn watch(&self, options: WatchOptions) -> Watching {
        let compiler = self.clone();
        let handle = tokio::spawn(async move { compiler.watch_loop(options).await });
        Watching {
            handle: Mutex::new(Some(handle)),
        }
    }

    async fn watch_loop(self, options: WatchOptions) {
        let watcher = FileWatcher::new(
            self.inner.context.clone(),
            self.output_path().to_path_buf(),
            options.ignored,
            options.aggregate_timeout,
        );
        let watcher = match watcher {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!("File watching disabled: {}", e);
                None
            }
        };

        self.run().await;

        let Some((watcher, mut changes)) = watcher else {
            return;
        };
        tracing::debug!("watching {}", watcher.root().display());

        while let Some(change) = changes.recv().await {
            tracing::debug!("changed: {}", change.path().display());
            self.invalidate(Some(change.path()));

            tokio::time::sleep(options.aggregate_timeout).await;
            while changes.try_recv().is_ok() {}

            self.run().await;
        }
    }
}

/// Running watch task. Dropping it stops watching.
pub struct Watching {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Watching {
    pub fn close(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }
}

impl Drop for Watching {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devpack_config::{
        EntryItem, LibraryTarget, Mode, Optimization, OutputConfig, Plugin, RuntimeChunk,
    };
    use indexmap::IndexMap;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn config(out: &Path, clean: bool) -> BuildConfig {
        let mut entry = IndexMap::new();
        entry.insert("main".to_string(), vec![EntryItem::module("./app/index.js")]);

        BuildConfig {
            mode: Mode::Development,
            devtool: false,
            entry,
            plugins: vec![Plugin::HotModuleReplacement],
            output: OutputConfig {
                filename: "[name].bundle.js".to_string(),
                library_target: LibraryTarget::Umd,
                path: out.to_path_buf(),
                public_path: "/".to_string(),
                clean,
            },
            optimization: Optimization {
                runtime_chunk: RuntimeChunk::Single,
            },
        }
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app")).unwrap();
        fs::write(temp.path().join("app/index.js"), "1;").unwrap();
        temp
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let temp = project();
        let mut config = config(&temp.path().join("out"), true);
        config.entry.clear();

        assert!(Compiler::new(config, temp.path()).is_err());
    }

    #[tokio::test]
    async fn test_run_fires_done_and_stores_result() {
        let temp = project();
        let compiler = Compiler::new(config(&temp.path().join("out"), true), temp.path()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        compiler.hooks().on_done(move |_stats| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let stats = compiler.run().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(compiler.stats().unwrap().hash, stats.hash);
        assert!(compiler.assets().contains("main.bundle.js"));
        assert!(!temp.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_clean_replaces_previous_graph() {
        let temp = project();
        let compiler = Compiler::new(config(&temp.path().join("out"), true), temp.path()).unwrap();

        compiler.run().await;
        fs::write(temp.path().join("app/index.js"), "2;").unwrap();
        compiler.run().await;
        fs::write(temp.path().join("app/index.js"), "3;").unwrap();
        let third = compiler.run().await;

        let hot_manifests = compiler
            .assets()
            .names()
            .filter(|n| n.ends_with(".hot-update.json"))
            .count();
        assert_eq!(hot_manifests, 1);
        assert_eq!(compiler.stats().unwrap().hash, third.hash);
    }

    #[tokio::test]
    async fn test_without_clean_assets_accumulate() {
        let temp = project();
        let compiler = Compiler::new(config(&temp.path().join("out"), false), temp.path()).unwrap();

        compiler.run().await;
        fs::write(temp.path().join("app/index.js"), "2;").unwrap();
        compiler.run().await;
        fs::write(temp.path().join("app/index.js"), "3;").unwrap();
        compiler.run().await;

        let hot_manifests = compiler
            .assets()
            .names()
            .filter(|n| n.ends_with(".hot-update.json"))
            .count();
        assert_eq!(hot_manifests, 2);
    }

    #[tokio::test]
    async fn test_write_to_disk_empties_output_first() {
        let temp = project();
        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.js"), "old").unwrap();

        let compiler = Compiler::new(config(&out, true), temp.path()).unwrap();
        compiler.set_write_to_disk(true);
        compiler.run().await;

        assert!(!out.join("stale.js").exists());
        assert_eq!(
            fs::read(out.join("main.bundle.js")).unwrap(),
            compiler.assets().get("main.bundle.js").unwrap().content.to_vec()
        );
    }

    #[tokio::test]
    async fn test_output_write_failure_still_fires_done() {
        let temp = project();
        fs::write(temp.path().join("blocker"), "not a directory").unwrap();
        let out = temp.path().join("blocker").join("out");

        let compiler = Compiler::new(config(&out, true), temp.path()).unwrap();
        compiler.set_write_to_disk(true);
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        compiler.hooks().on_done(move |_stats| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let stats = compiler.run().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains(&out.display().to_string()));
        assert!(compiler.assets().contains("main.bundle.js"));
    }

    #[tokio::test]
    async fn test_invalidate_fires_invalid_hook() {
        let temp = project();
        let compiler = Compiler::new(config(&temp.path().join("out"), true), temp.path()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        compiler.hooks().on_invalid(move |path| {
            sink.lock().push(path.map(Path::to_path_buf));
        });

        compiler.invalidate(Some(Path::new("/project/app/index.js")));
        compiler.invalidate(None);

        assert_eq!(
            *seen.lock(),
            vec![Some(PathBuf::from("/project/app/index.js")), None]
        );
    }

    #[tokio::test]
    async fn test_watch_runs_initial_compilation() {
        let temp = project();
        let compiler = Compiler::new(config(&temp.path().join("out"), true), temp.path()).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        compiler.hooks().on_done(move |stats| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(stats.hash.clone());
            }
        });

        let watching = compiler.watch(WatchOptions::default());
        let hash = rx.await.unwrap();

        assert_eq!(compiler.stats().unwrap().hash, hash);
        watching.close();
        assert!(watching.is_closed());
    }
}
