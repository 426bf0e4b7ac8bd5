//! Event handlers wrapping legacy middleware.
//!
//! [`BuildServingAdapter`] mounts the dev middleware: it publishes the
//! middleware context on the request, waits for the middleware's single
//! outcome and logs every request it answers. [`LegacyHandler`] does the same
//! bridging for any legacy middleware, without context or logging.

use crate::dev_middleware::DevMiddleware;
use crate::error::{DevError, Result};
use crate::host::{ContextValue, EventHandler, RequestEvent, ResponseBody};
use crate::legacy::{self, LegacyMiddleware, Outcome};
use async_trait::async_trait;
use std::sync::Arc;

/// Context namespace the adapter writes into.
pub const CONTEXT_NAMESPACE: &str = "webpack";

/// Key of the dev middleware context inside [`CONTEXT_NAMESPACE`].
pub const CONTEXT_KEY: &str = "devMiddleware";

async fn run_middleware(
    middleware: &dyn LegacyMiddleware,
    event: &mut RequestEvent,
) -> Result<Option<ResponseBody>> {
    let outcome: Outcome = legacy::invoke(middleware, event).await?;
    outcome.into_body().map_err(DevError::Middleware)
}

/// Serves build output through the dev middleware.
pub struct BuildServingAdapter {
    middleware: Arc<dyn LegacyMiddleware>,
    context: ContextValue,
}

impl BuildServingAdapter {
    pub fn new(dev: DevMiddleware) -> Self {
        let context: ContextValue = dev.context();
        Self::with_context(Arc::new(dev), context)
    }

    /// Adapt any legacy middleware, publishing `context` under
    /// `webpack.devMiddleware`.
    pub fn with_context(middleware: Arc<dyn LegacyMiddleware>, context: ContextValue) -> Self {
        Self {
            middleware,
            context,
        }
    }
}

#[async_trait]
impl EventHandler for BuildServingAdapter {
    async fn handle(&self, event: &mut RequestEvent) -> Result<Option<ResponseBody>> {
        event.context.merge(
            CONTEXT_NAMESPACE,
            [(CONTEXT_KEY.to_string(), Arc::clone(&self.context))],
        );

        let body = run_middleware(self.middleware.as_ref(), event).await?;
        if body.is_some() {
            tracing::info!("[wdm] {}", event.path());
        }
        Ok(body)
    }
}

/// Mounts a legacy middleware as an event handler.
pub struct LegacyHandler {
    middleware: Arc<dyn LegacyMiddleware>,
}

impl LegacyHandler {
    pub fn new(middleware: impl LegacyMiddleware) -> Self {
        Self {
            middleware: Arc::new(middleware),
        }
    }
}

#[async_trait]
impl EventHandler for LegacyHandler {
    async fn handle(&self, event: &mut RequestEvent) -> Result<Option<ResponseBody>> {
        run_middleware(self.middleware.as_ref(), event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RequestHead;
    use crate::legacy::{LegacyResponse, Next};
    use axum::body::Bytes;
    use axum::http::{Method, StatusCode, Uri};
    use parking_lot::Mutex;
    use std::io;
    use thiserror::Error;
    use tokio_stream::StreamExt;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn lines_containing(&self, needle: &str) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .filter(|line| line.contains(needle))
                .map(str::to_string)
                .collect()
        }
    }

    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (buffer, guard)
    }

    #[derive(Debug, Error)]
    #[error("compiler exploded")]
    struct Exploded;

    struct Marker(&'static str);

    fn event(path: &'static str) -> RequestEvent {
        RequestEvent::new(RequestHead::new(Method::GET, Uri::from_static(path)))
    }

    fn adapter(middleware: impl LegacyMiddleware) -> BuildServingAdapter {
        BuildServingAdapter::with_context(Arc::new(middleware), Arc::new(Marker("dev")))
    }

    #[tokio::test]
    async fn test_pass_through_returns_none_without_log() {
        let (logs, _guard) = capture_logs();
        let adapter = adapter(|_req: RequestHead, _res: LegacyResponse, next: Next| next.pass());
        let mut event = event("/api/unrelated");

        let body = adapter.handle(&mut event).await.unwrap();

        assert!(body.is_none());
        assert!(logs.lines_containing("[wdm]").is_empty());
    }

    #[tokio::test]
    async fn test_stream_is_returned_and_logged_once() {
        let (logs, _guard) = capture_logs();
        let adapter = adapter(|_req: RequestHead, res: LegacyResponse, _next: Next| {
            let chunks: Vec<io::Result<Bytes>> = vec![
                Ok(Bytes::from_static(b"hello ")),
                Ok(Bytes::from_static(b"world")),
            ];
            res.stream(Box::pin(tokio_stream::iter(chunks)));
        });
        let mut event = event("/main.bundle.js");

        let body = adapter.handle(&mut event).await.unwrap();

        let Some(ResponseBody::Stream(mut stream)) = body else {
            panic!("expected a stream body");
        };
        let mut content = Vec::new();
        while let Some(chunk) = stream.next().await {
            content.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(content, b"hello world");

        let lines = logs.lines_containing("[wdm]");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[wdm] /main.bundle.js"));
    }

    #[tokio::test]
    async fn test_next_with_error_surfaces_it() {
        let (logs, _guard) = capture_logs();
        let adapter = adapter(|_req: RequestHead, _res: LegacyResponse, next: Next| {
            next.fail(Exploded);
        });
        let mut event = event("/main.bundle.js");

        let err = adapter.handle(&mut event).await.unwrap_err();

        match err {
            DevError::Middleware(source) => assert!(source.downcast_ref::<Exploded>().is_some()),
            other => panic!("expected a middleware error, got {other:?}"),
        }
        assert!(logs.lines_containing("[wdm]").is_empty());
    }

    #[tokio::test]
    async fn test_context_merge_keeps_other_keys() {
        let adapter = adapter(|_req: RequestHead, _res: LegacyResponse, next: Next| next.pass());
        let mut event = event("/x");
        event
            .context
            .insert(CONTEXT_NAMESPACE, "hotClient", Arc::new(Marker("hot")));

        adapter.handle(&mut event).await.unwrap();

        assert_eq!(
            event.context.get::<Marker>(CONTEXT_NAMESPACE, "hotClient").unwrap().0,
            "hot"
        );
        assert_eq!(
            event.context.get::<Marker>(CONTEXT_NAMESPACE, CONTEXT_KEY).unwrap().0,
            "dev"
        );
    }

    #[tokio::test]
    async fn test_context_published_when_answered() {
        let adapter = adapter(|_req: RequestHead, res: LegacyResponse, _next: Next| {
            res.send("ok");
        });
        let mut event = event("/x");

        adapter.handle(&mut event).await.unwrap();

        assert!(event.context.contains(CONTEXT_NAMESPACE, CONTEXT_KEY));
    }

    #[tokio::test]
    async fn test_first_completion_wins() {
        let (logs, _guard) = capture_logs();
        let adapter = adapter(|_req: RequestHead, res: LegacyResponse, _next: Next| {
            res.finish(Some(Bytes::from_static(b"finished")));
            let late: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"late"))];
            res.stream(Box::pin(tokio_stream::iter(late)));
        });
        let mut event = event("/index.html");

        let body = adapter.handle(&mut event).await.unwrap();

        match body {
            Some(ResponseBody::Bytes(bytes)) => assert_eq!(&bytes[..], b"finished"),
            other => panic!("unexpected body {other:?}"),
        }
        assert_eq!(logs.lines_containing("[wdm]").len(), 1);
    }

    #[tokio::test]
    async fn test_finish_without_payload_passes_through() {
        let adapter = adapter(|_req: RequestHead, res: LegacyResponse, _next: Next| {
            res.set_status(StatusCode::NO_CONTENT);
            res.finish(None);
        });
        let mut event = event("/x");

        assert!(adapter.handle(&mut event).await.unwrap().is_none());
        assert_eq!(event.response.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_legacy_handler_does_not_log() {
        let (logs, _guard) = capture_logs();
        let handler = LegacyHandler::new(|_req: RequestHead, res: LegacyResponse, _next: Next| {
            res.send("plain");
        });
        let mut event = event("/plain");

        let body = handler.handle(&mut event).await.unwrap();

        assert!(matches!(body, Some(ResponseBody::Bytes(_))));
        assert!(logs.lines_containing("[wdm]").is_empty());
        assert!(!event.context.contains(CONTEXT_NAMESPACE, CONTEXT_KEY));
    }
}
