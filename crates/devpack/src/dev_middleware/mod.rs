//! Serves the compiler's output from memory.
//!
//! [`DevMiddleware`] is a legacy middleware: it answers requests for emitted
//! assets and calls `next` for everything else. Requests arriving while a
//! compilation is running wait until it finishes.

mod context;

pub use context::DevMiddlewareContext;

use crate::compiler::{Compiler, Stats, WatchOptions};
use crate::host::RequestHead;
use crate::legacy::{LegacyMiddleware, LegacyResponse, Next};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use std::path::{Component, Path};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

#[derive(Debug, Clone)]
pub struct DevMiddlewareOptions {
    /// Methods answered from the asset graph; others go to `next`
    pub methods: Vec<Method>,

    /// URL prefix of the assets; defaults to the compiler's public path
    pub public_path: Option<String>,

    /// File served for directory URLs; `None` disables index lookup
    pub index: Option<String>,

    /// Extra headers added to every asset response
    pub headers: HeaderMap,

    /// Also write assets to the output directory
    pub write_to_disk: bool,

    pub watch: WatchOptions,
}

impl Default for DevMiddlewareOptions {
    fn default() -> Self {
        Self {
            methods: vec![Method::GET, Method::HEAD],
            public_path: None,
            index: Some("index.html".to_string()),
            headers: HeaderMap::new(),
            write_to_disk: false,
            watch: WatchOptions::default(),
        }
    }
}

struct Inner {
    compiler: Compiler,
    context: Arc<DevMiddlewareContext>,
    options: DevMiddlewareOptions,
}

/// Handle to the dev middleware. Clones share one context.
#[derive(Clone)]
pub struct DevMiddleware {
    inner: Arc<Inner>,
}

impl DevMiddleware {
    /// Tap the compiler's hooks and start watching.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(compiler: Compiler, options: DevMiddlewareOptions) -> Self {
        let context = Arc::new(DevMiddlewareContext::new());

        let weak = Arc::downgrade(&context);
        compiler.hooks().on_invalid(move |changed| {
            if let Some(context) = weak.upgrade() {
                if let Some(path) = changed {
                    tracing::debug!("invalidated by {}", path.display());
                }
                context.invalidate();
            }
        });

        let weak = Arc::downgrade(&context);
        compiler.hooks().on_done(move |stats| {
            if let Some(context) = weak.upgrade() {
                context.done(Arc::clone(stats));
            }
        });

        compiler.set_write_to_disk(options.write_to_disk);
        context.set_watching(compiler.watch(options.watch.clone()));

        Self {
            inner: Arc::new(Inner {
                compiler,
                context,
                options,
            }),
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.inner.compiler
    }

    pub fn context(&self) -> Arc<DevMiddlewareContext> {
        Arc::clone(&self.inner.context)
    }

    pub fn options(&self) -> &DevMiddlewareOptions {
        &self.inner.options
    }

    /// Wait for the current compilation; `None` once closed.
    pub async fn wait_until_valid(&self) -> Option<Arc<Stats>> {
        self.inner.context.wait_until_valid().await
    }

    /// Stop watching. Waiting requests are passed on to `next`.
    pub fn close(&self) {
        self.inner.context.close();
    }

    fn public_path(&self) -> &str {
        self.inner
            .options
            .public_path
            .as_deref()
            .unwrap_or(&self.inner.compiler.config().output.public_path)
    }

    /// Map a request URL to an asset name relative to the output directory.
    ///
    /// Returns `None` for URLs outside the public path, paths escaping the
    /// output directory, and directory URLs when index lookup is disabled.
    pub fn filename_from_url(&self, url: &str) -> Option<String> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let public_path = self.public_path();

        let relative = if public_path.ends_with('/') {
            path.strip_prefix(public_path)
                .or_else(|| (path == public_path.trim_end_matches('/')).then_some(""))?
        } else {
            let rest = path.strip_prefix(public_path)?;
            if rest.is_empty() {
                rest
            } else {
                rest.strip_prefix('/')?
            }
        };

        let is_safe = Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !is_safe {
            return None;
        }

        if relative.is_empty() || relative.ends_with('/') {
            let index = self.inner.options.index.as_deref()?;
            return Some(format!("{relative}{index}"));
        }

        Some(relative.to_string())
    }

    fn write_headers(&self, res: &LegacyResponse, content_type: &'static str, length: u64) {
        if !res.has_header(&header::CONTENT_TYPE) {
            res.set_header(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        res.set_header(header::CONTENT_LENGTH, HeaderValue::from(length));
        for (name, value) in &self.inner.options.headers {
            res.set_header(name.clone(), value.clone());
        }
    }

    async fn serve(&self, req: RequestHead, res: LegacyResponse, next: Next) {
        if !self.inner.options.methods.contains(&req.method) {
            next.pass();
            return;
        }

        if self.wait_until_valid().await.is_none() {
            tracing::debug!("dev middleware closed, passing {}", req.path());
            next.pass();
            return;
        }

        let Some(filename) = self.filename_from_url(req.path()) else {
            next.pass();
            return;
        };

        let assets = self.inner.compiler.assets();
        if let Some(asset) = assets.get(&filename) {
            self.write_headers(&res, asset.content_type, asset.content.len() as u64);
            if req.method == Method::HEAD {
                res.finish(Some(Default::default()));
            } else {
                res.send(asset.content.clone());
            }
            return;
        }

        if self.inner.options.write_to_disk {
            let path = self.inner.compiler.output_path().join(&filename);
            if let Ok(file) = tokio::fs::File::open(&path).await {
                match file.metadata().await {
                    Ok(metadata) if metadata.is_file() => {
                        let content_type = crate::compiler::assets::content_type_for(&filename);
                        self.write_headers(&res, content_type, metadata.len());
                        if req.method == Method::HEAD {
                            res.finish(Some(Default::default()));
                        } else {
                            res.stream(Box::pin(ReaderStream::new(file)));
                        }
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to stat {}: {}", path.display(), e),
                }
            }
        }

        next.pass();
    }
}

impl LegacyMiddleware for DevMiddleware {
    fn call(&self, req: RequestHead, res: LegacyResponse, next: Next) {
        let middleware = self.clone();
        tokio::spawn(async move { middleware.serve(req, res, next).await });
    }
}
