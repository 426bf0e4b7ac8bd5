//! Development module setup.
//!
//! Wires one compiler into a host server: the output directory becomes a
//! public asset mount, the build-serving adapter and the hot-update handler
//! are registered as dev handlers, in that order.

use crate::adapter::{BuildServingAdapter, LegacyHandler};
use crate::compiler::Compiler;
use crate::dev_middleware::{DevMiddleware, DevMiddlewareOptions};
use crate::error::Result;
use crate::host::{DevHandlerEntry, PublicAssetDir, ServerOptions};
use crate::hot::{HotMiddleware, HotMiddlewareOptions};
use devpack_config::{
    BuildConfig, DevModuleOptions, EntryItem, HotClientOptions, LibraryTarget, Mode,
    Optimization, OutputConfig, Plugin, RuntimeChunk,
};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Output filename pattern of entry chunks.
pub const OUTPUT_FILENAME: &str = "[name].bundle.js";

/// Handles created by [`setup`].
pub struct DevModule {
    output_dir: PathBuf,
    compiler: Compiler,
    dev_middleware: DevMiddleware,
    hot_middleware: HotMiddleware,
}

impl DevModule {
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn dev_middleware(&self) -> &DevMiddleware {
        &self.dev_middleware
    }

    pub fn hot_middleware(&self) -> &HotMiddleware {
        &self.hot_middleware
    }

    /// Stop watching and disconnect hot-update clients.
    pub fn close(&self) {
        self.dev_middleware.close();
        self.hot_middleware.close();
    }
}

/// Build configuration for the development module.
pub fn build_config(options: &DevModuleOptions, output_dir: &Path) -> BuildConfig {
    let hot_client = HotClientOptions {
        path: options.hmr.path.clone(),
        timeout_ms: options.hmr.timeout_ms,
        reload: options.hmr.reload,
    };

    let mut entry = IndexMap::new();
    entry.insert(
        options.entry_name.clone(),
        vec![
            EntryItem::HotClient(hot_client),
            EntryItem::module(options.app_entry.clone()),
        ],
    );

    BuildConfig {
        mode: Mode::Development,
        devtool: false,
        entry,
        plugins: vec![
            Plugin::HtmlShell {
                title: options.html_title.clone(),
            },
            Plugin::HotModuleReplacement,
        ],
        output: OutputConfig {
            filename: OUTPUT_FILENAME.to_string(),
            library_target: LibraryTarget::Umd,
            path: output_dir.to_path_buf(),
            public_path: "/".to_string(),
            clean: true,
        },
        optimization: Optimization {
            runtime_chunk: RuntimeChunk::Single,
        },
    }
}

/// Register the development module on `server`.
///
/// Must be called from within a Tokio runtime: the dev middleware starts
/// watching immediately.
///
/// # Errors
///
/// Returns error if the options or the resulting build configuration are
/// invalid. Nothing is registered on `server` in that case.
pub fn setup(server: &mut ServerOptions, options: &DevModuleOptions) -> Result<DevModule> {
    options.validate()?;

    let output_dir = server.build_dir.join(&options.output_subdir);
    let compiler = Compiler::new(build_config(options, &output_dir), &server.root_dir)?;

    server.public_assets.push(PublicAssetDir {
        dir: output_dir.clone(),
        base_url: "/".to_string(),
        fallthrough: true,
        max_age: 0,
    });

    // Must subscribe before the dev middleware starts watching
    let hot_middleware = HotMiddleware::new(
        &compiler,
        HotMiddlewareOptions {
            path: options.hmr.path.clone(),
            heartbeat: Duration::from_millis(options.hmr.heartbeat_ms),
        },
    );

    let dev_middleware = DevMiddleware::new(
        compiler.clone(),
        DevMiddlewareOptions {
            write_to_disk: options.write_to_disk,
            ..Default::default()
        },
    );
    server.dev_handlers.push(DevHandlerEntry::new(Arc::new(
        BuildServingAdapter::new(dev_middleware.clone()),
    )));
    server.dev_handlers.push(DevHandlerEntry::new(Arc::new(LegacyHandler::new(
        hot_middleware.clone(),
    ))));

    tracing::debug!(
        "dev module ready: output {}, hot updates on {}",
        output_dir.display(),
        options.hmr.path
    );

    Ok(DevModule {
        output_dir,
        compiler,
        dev_middleware,
        hot_middleware,
    })
}
