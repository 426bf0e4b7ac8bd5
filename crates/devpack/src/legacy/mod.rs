//! Legacy three-argument middleware interface.
//!
//! A legacy middleware receives the request, a mutable response handle and a
//! continuation. It completes the request by calling exactly one of
//! [`LegacyResponse::stream`], [`LegacyResponse::send`],
//! [`LegacyResponse::finish`] or [`Next::call`], possibly later from another
//! task. [`invoke`] turns that protocol into a single awaited [`Outcome`].

mod completion;

pub use completion::Outcome;

use crate::error::{BoxError, DevError, Result};
use crate::host::{BodyStream, RequestEvent, RequestHead, ResponseParts};
use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use completion::Completion;
use parking_lot::Mutex;
use std::sync::Arc;

/// Callback-style middleware.
pub trait LegacyMiddleware: Send + Sync + 'static {
    fn call(&self, req: RequestHead, res: LegacyResponse, next: Next);
}

impl<F> LegacyMiddleware for F
where
    F: Fn(RequestHead, LegacyResponse, Next) + Send + Sync + 'static,
{
    fn call(&self, req: RequestHead, res: LegacyResponse, next: Next) {
        self(req, res, next)
    }
}

/// Response handle given to a legacy middleware.
///
/// Cloning is cheap; all clones write the same status, headers and
/// completion cell.
#[derive(Clone)]
pub struct LegacyResponse {
    parts: Arc<Mutex<ResponseParts>>,
    completion: Arc<Completion>,
}

impl LegacyResponse {
    pub fn set_status(&self, status: StatusCode) {
        self.parts.lock().status = status;
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.parts.lock().headers.insert(name, value);
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.parts.lock().headers.get(name).cloned()
    }

    pub fn has_header(&self, name: &HeaderName) -> bool {
        self.parts.lock().headers.contains_key(name)
    }

    /// Pipe `stream` as the response body.
    pub fn stream(&self, stream: BodyStream) {
        self.completion.resolve(Outcome::Stream(stream));
    }

    /// Send a complete payload.
    pub fn send(&self, data: impl Into<Bytes>) {
        self.completion.resolve(Outcome::Buffered(data.into()));
    }

    /// End the response, optionally with a payload.
    pub fn finish(&self, data: Option<Bytes>) {
        self.completion.resolve(Outcome::Finished(data));
    }

    /// Whether any completion path already ran.
    pub fn is_finished(&self) -> bool {
        self.completion.is_resolved()
    }
}

/// Continuation given to a legacy middleware.
#[derive(Clone)]
pub struct Next {
    completion: Arc<Completion>,
}

impl Next {
    /// Report an error, or `None` to hand the request to the next handler.
    pub fn call(&self, err: Option<BoxError>) {
        let outcome = match err {
            Some(err) => Outcome::Failed(err),
            None => Outcome::Next,
        };
        self.completion.resolve(outcome);
    }

    pub fn pass(&self) {
        self.call(None);
    }

    pub fn fail(&self, err: impl Into<BoxError>) {
        self.call(Some(err.into()));
    }
}

/// Run `middleware` for `event` and wait for its first completion.
///
/// Status and headers written through the response handle are copied back
/// onto `event.response`.
///
/// # Errors
///
/// Returns [`DevError::Abandoned`] if every handle was dropped before any
/// completion path ran. There is no timeout: a middleware that keeps its
/// handles and never completes keeps the request pending.
pub async fn invoke(middleware: &dyn LegacyMiddleware, event: &mut RequestEvent) -> Result<Outcome> {
    let parts = Arc::new(Mutex::new(std::mem::take(&mut event.response)));
    let (completion, outcome) = Completion::channel();

    let res = LegacyResponse {
        parts: Arc::clone(&parts),
        completion: Arc::clone(&completion),
    };
    let next = Next { completion };

    middleware.call(event.head.clone(), res, next);

    let outcome = outcome.await;
    event.response = parts.lock().clone();

    outcome.map_err(|_| DevError::Abandoned {
        path: event.path().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Uri, header};

    fn event(path: &'static str) -> RequestEvent {
        RequestEvent::new(RequestHead::new(Method::GET, Uri::from_static(path)))
    }

    #[tokio::test]
    async fn test_invoke_copies_response_parts_back() {
        let middleware = |_req: RequestHead, res: LegacyResponse, _next: Next| {
            res.set_status(StatusCode::ACCEPTED);
            res.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            res.send("ok");
        };
        let mut event = event("/x");

        let outcome = invoke(&middleware, &mut event).await.unwrap();

        assert!(matches!(outcome, Outcome::Buffered(_)));
        assert_eq!(event.response.status, StatusCode::ACCEPTED);
        assert_eq!(event.response.headers[header::CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_invoke_waits_for_deferred_completion() {
        let middleware = |_req: RequestHead, res: LegacyResponse, _next: Next| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                res.finish(Some(Bytes::from_static(b"later")));
            });
        };
        let mut event = event("/x");

        let outcome = invoke(&middleware, &mut event).await.unwrap();

        match outcome {
            Outcome::Finished(Some(bytes)) => assert_eq!(&bytes[..], b"later"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_reports_abandoned_request() {
        let middleware = |_req: RequestHead, _res: LegacyResponse, _next: Next| {};
        let mut event = event("/dropped");

        let err = invoke(&middleware, &mut event).await.unwrap_err();

        assert!(matches!(err, DevError::Abandoned { ref path } if path == "/dropped"));
    }

    #[tokio::test]
    async fn test_next_after_send_is_ignored() {
        let middleware = |_req: RequestHead, res: LegacyResponse, next: Next| {
            res.send("payload");
            assert!(res.is_finished());
            next.fail("too late");
        };
        let mut event = event("/x");

        let outcome = invoke(&middleware, &mut event).await.unwrap();

        assert!(matches!(outcome, Outcome::Buffered(_)));
    }
}
