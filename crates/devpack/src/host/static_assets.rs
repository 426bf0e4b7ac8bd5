//! Public asset directories served by the host after dev handlers.
//!
//! Each mount is served by [`ServeDir`]; the dispatcher decides whether a
//! miss falls through to the next mount.

use crate::host::RequestHead;
use axum::{
    body::Body,
    http::{HeaderValue, Method, Request, Response, StatusCode, Uri, header},
};
use std::path::PathBuf;
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// A directory published under a URL prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAssetDir {
    /// Directory on disk
    pub dir: PathBuf,

    /// URL prefix, e.g. `/` or `/assets`
    pub base_url: String,

    /// Missing files fall through to later handlers instead of answering 404
    pub fallthrough: bool,

    /// `Cache-Control` max-age in seconds
    pub max_age: u64,
}

impl PublicAssetDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            base_url: "/".to_string(),
            fallthrough: false,
            max_age: 0,
        }
    }

    /// Whether a URL path lies under this mount's base URL.
    pub fn matches(&self, path: &str) -> bool {
        self.relative_path(path).is_some()
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn relative_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.base())?;
        if rest.is_empty() {
            return Some("");
        }
        rest.strip_prefix('/')
    }

    /// Serve a file for the request, or `None` if the mount has no such file.
    pub(crate) async fn serve(&self, head: &RequestHead) -> Option<Response<Body>> {
        if head.method != Method::GET && head.method != Method::HEAD {
            return None;
        }

        let relative = self.relative_path(head.path())?;
        let uri: Uri = format!("/{relative}").parse().ok()?;
        let mut request = Request::new(Body::empty());
        *request.method_mut() = head.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = head.headers.clone();

        let response = match ServeDir::new(&self.dir).oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let response: Response<Body> = response.map(Body::new);

        match response.status() {
            StatusCode::NOT_FOUND => None,
            status if status.is_redirection() => Some(self.rebase_location(response)),
            _ => Some(self.with_cache_control(response)),
        }
    }

    fn with_cache_control(&self, mut response: Response<Body>) -> Response<Body> {
        if response.status().is_success() || response.status() == StatusCode::NOT_MODIFIED {
            let value = format!("public, max-age={}", self.max_age);
            if let Ok(value) = HeaderValue::from_str(&value) {
                response.headers_mut().insert(header::CACHE_CONTROL, value);
            }
        }
        response
    }

    // Directory redirects are relative to the mount, not the site
    fn rebase_location(&self, mut response: Response<Body>) -> Response<Body> {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|location| format!("{}{}", self.base(), location));
        if let Some(value) = location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            response.headers_mut().insert(header::LOCATION, value);
        }
        response
    }
}
