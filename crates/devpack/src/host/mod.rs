//! Host request pipeline.
//!
//! The host knows nothing about bundling. It owns:
//! - [`ServerOptions`]: the mutable collections a module appends to during
//!   setup (public asset mounts, dev handlers)
//! - [`EventHandler`]: the single-argument handler interface; a handler
//!   returns a body, or `None` to let the next handler run
//! - [`Dispatcher`]: runs dev handlers in order, then public asset mounts

pub mod context;
pub mod dispatch;
pub mod static_assets;

pub use context::{ContextNamespace, ContextValue, RequestContext};
pub use dispatch::Dispatcher;
pub use static_assets::PublicAssetDir;

use crate::error::Result;
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, StatusCode, Uri, request::Parts},
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// A live response body stream.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Method, URI and headers of an incoming request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Full request URI, including the query string
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Status and headers accumulated while a request is handled.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    /// Defaults to 200
    pub status: StatusCode,
    /// Headers set by handlers, sent with the body that answers the request
    pub headers: HeaderMap,
}

impl Default for ResponseParts {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Payload returned by a handler.
pub enum ResponseBody {
    /// Body produced incrementally (event streams, files)
    Stream(BodyStream),
    /// Complete in-memory body
    Bytes(Bytes),
}

impl ResponseBody {
    pub fn into_body(self) -> Body {
        match self {
            ResponseBody::Stream(stream) => Body::from_stream(stream),
            ResponseBody::Bytes(bytes) => Body::from(bytes),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, ResponseBody::Stream(_))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Stream(_) => f.write_str("ResponseBody::Stream(..)"),
            ResponseBody::Bytes(bytes) => f
                .debug_tuple("ResponseBody::Bytes")
                .field(&bytes.len())
                .finish(),
        }
    }
}

/// Per-request state handed through the handler chain.
#[derive(Debug)]
pub struct RequestEvent {
    /// Incoming request; handlers only read it
    pub head: RequestHead,
    /// Shared map for handlers of the same request
    pub context: RequestContext,
    /// Status and headers of the eventual response
    pub response: ResponseParts,
}

impl RequestEvent {
    pub fn new(head: RequestHead) -> Self {
        Self {
            head,
            context: RequestContext::default(),
            response: ResponseParts::default(),
        }
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }
}

/// Single-argument request handler.
///
/// `Ok(None)` means "not handled here"; the dispatcher moves on to the next
/// handler. `Err` fails the request.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &mut RequestEvent) -> Result<Option<ResponseBody>>;
}

/// A development-only handler registration.
#[derive(Clone)]
pub struct DevHandlerEntry {
    /// Only requests whose path starts with this prefix reach the handler
    pub route: Option<String>,
    /// Handler invoked for matching requests
    pub handler: Arc<dyn EventHandler>,
}

impl DevHandlerEntry {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            route: None,
            handler,
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        self.route
            .as_deref()
            .is_none_or(|prefix| path.starts_with(prefix))
    }
}

impl fmt::Debug for DevHandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevHandlerEntry")
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

/// Host server configuration that modules extend during setup.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Project root; compiler context directory
    pub root_dir: PathBuf,

    /// Directory for generated files
    pub build_dir: PathBuf,

    /// Publicly served directories, checked after dev handlers
    pub public_assets: Vec<PublicAssetDir>,

    /// Development handlers, run in order
    pub dev_handlers: Vec<DevHandlerEntry>,
}

impl ServerOptions {
    /// Create options; a relative `build_dir` is resolved against `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>, build_dir: impl AsRef<Path>) -> Self {
        let root_dir = root_dir.into();
        let build_dir = if build_dir.as_ref().is_absolute() {
            build_dir.as_ref().to_path_buf()
        } else {
            root_dir.join(build_dir)
        };

        Self {
            root_dir,
            build_dir,
            public_assets: Vec::new(),
            dev_handlers: Vec::new(),
        }
    }
}
