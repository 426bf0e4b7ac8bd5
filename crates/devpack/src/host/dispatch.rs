//! Request dispatch over dev handlers and public asset mounts.

use crate::error::{DevError, Result};
use crate::host::{
    DevHandlerEntry, PublicAssetDir, RequestEvent, RequestHead, ResponseBody, ResponseParts,
    ServerOptions,
};
use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, Response, StatusCode, header},
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Runs the host pipeline for one request at a time.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    handlers: Vec<DevHandlerEntry>,
    public_assets: Vec<PublicAssetDir>,
}

impl Dispatcher {
    /// Snapshot the handlers and mounts registered in `options`.
    pub fn new(options: &ServerOptions) -> Self {
        Self {
            handlers: options.dev_handlers.clone(),
            public_assets: options.public_assets.clone(),
        }
    }

    /// Handle one request.
    ///
    /// Dev handlers run in registration order; the first one returning a
    /// body answers the request. A handler error answers 500. Public asset
    /// mounts are tried next; a mount without fallthrough answers 404 for
    /// files it does not have.
    pub async fn dispatch(&self, head: RequestHead) -> Response<Body> {
        let mut event = RequestEvent::new(head);

        for entry in &self.handlers {
            if !entry.matches(event.path()) {
                continue;
            }

            match entry.handler.handle(&mut event).await {
                Ok(Some(body)) => {
                    let parts = std::mem::take(&mut event.response);
                    return respond(parts, body);
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("{} {} failed: {}", event.head.method, event.path(), e);
                    return error_response(&e);
                }
            }
        }

        for mount in &self.public_assets {
            if !mount.matches(event.path()) {
                continue;
            }
            if let Some(response) = mount.serve(&event.head).await {
                return response;
            }
            if !mount.fallthrough {
                return not_found(event.path());
            }
        }

        not_found(event.path())
    }

    /// Build an axum router that sends every request through [`dispatch`].
    ///
    /// [`dispatch`]: Dispatcher::dispatch
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(handle_request)
            .layer(
                // CORS: Allow all origins for dev
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(Arc::new(self))
    }

    /// Serve on `addr` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the server fails
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.into_router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| DevError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("Development server running at http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| DevError::Server(format!("Server error: {}", e)))?;

        Ok(())
    }
}

async fn handle_request(State(dispatcher): State<Arc<Dispatcher>>, request: Request) -> Response<Body> {
    let (parts, _body) = request.into_parts();
    dispatcher.dispatch(RequestHead::from_parts(&parts)).await
}

fn respond(parts: ResponseParts, body: ResponseBody) -> Response<Body> {
    let mut response = Response::new(body.into_body());
    *response.status_mut() = parts.status;
    *response.headers_mut() = parts.headers;
    response
}

fn error_response(error: &DevError) -> Response<Body> {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

fn not_found(path: &str) -> Response<Body> {
    text_response(StatusCode::NOT_FOUND, format!("Cannot find any path matching {path}"))
}

fn text_response(status: StatusCode, message: String) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::EventHandler;
    use async_trait::async_trait;
    use axum::body::{Bytes, to_bytes};
    use axum::http::{Method, Uri};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixed(&'static str);

    #[async_trait]
    impl EventHandler for Fixed {
        async fn handle(&self, event: &mut RequestEvent) -> Result<Option<ResponseBody>> {
            event.response.status = StatusCode::CREATED;
            Ok(Some(ResponseBody::Bytes(Bytes::from_static(self.0.as_bytes()))))
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, _event: &mut RequestEvent) -> Result<Option<ResponseBody>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _event: &mut RequestEvent) -> Result<Option<ResponseBody>> {
            Err(DevError::Server("handler exploded".to_string()))
        }
    }

    fn get(path: &'static str) -> RequestHead {
        RequestHead::new(Method::GET, Uri::from_static(path))
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_handlers_run_in_order_until_one_answers() {
        let counting = Arc::new(Counting::default());
        let mut options = ServerOptions::new("/project", "build");
        options.dev_handlers.push(DevHandlerEntry::new(counting.clone()));
        options.dev_handlers.push(DevHandlerEntry::new(Arc::new(Fixed("second"))));
        options.dev_handlers.push(DevHandlerEntry::new(counting.clone()));

        let response = Dispatcher::new(&options).dispatch(get("/x")).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_string(response).await, "second");
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_answers_500() {
        let mut options = ServerOptions::new("/project", "build");
        options.dev_handlers.push(DevHandlerEntry::new(Arc::new(Failing)));
        options.dev_handlers.push(DevHandlerEntry::new(Arc::new(Fixed("unreached"))));

        let response = Dispatcher::new(&options).dispatch(get("/x")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_route_prefix_skips_handler() {
        let mut options = ServerOptions::new("/project", "build");
        options
            .dev_handlers
            .push(DevHandlerEntry::new(Arc::new(Fixed("api"))).with_route("/api"));

        let dispatcher = Dispatcher::new(&options);

        assert_eq!(dispatcher.dispatch(get("/api/users")).await.status(), StatusCode::CREATED);
        assert_eq!(dispatcher.dispatch(get("/other")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_assets_fallthrough() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(second.path().join("logo.svg"), b"<svg/>").unwrap();

        let mut options = ServerOptions::new("/project", "build");
        options.public_assets.push(PublicAssetDir {
            fallthrough: true,
            ..PublicAssetDir::new(first.path())
        });
        options.public_assets.push(PublicAssetDir::new(second.path()));

        let response = Dispatcher::new(&options).dispatch(get("/logo.svg")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "<svg/>");
    }

    #[tokio::test]
    async fn test_public_assets_without_fallthrough_answers_404() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(second.path().join("logo.svg"), b"<svg/>").unwrap();

        let mut options = ServerOptions::new("/project", "build");
        options.public_assets.push(PublicAssetDir::new(first.path()));
        options.public_assets.push(PublicAssetDir::new(second.path()));

        let response = Dispatcher::new(&options).dispatch(get("/logo.svg")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
