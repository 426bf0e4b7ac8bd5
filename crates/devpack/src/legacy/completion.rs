//! Single-resolution completion cell.
//!
//! Every completion path of a legacy middleware (`stream`, `send`, `finish`,
//! `next`) resolves the same cell. The first resolution is delivered; all
//! later ones are dropped.

use crate::error::BoxError;
use crate::host::{BodyStream, ResponseBody};
use axum::body::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// How a legacy middleware completed a request.
pub enum Outcome {
    /// Pipe a live stream as the response body
    Stream(BodyStream),
    /// Complete in-memory payload
    Buffered(Bytes),
    /// Explicit finish; `None` means no payload was produced
    Finished(Option<Bytes>),
    /// Continuation called without error: not handled here
    Next,
    /// Continuation called with an error
    Failed(BoxError),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Stream(_) => "stream",
            Outcome::Buffered(_) => "buffered",
            Outcome::Finished(_) => "finish",
            Outcome::Next => "next",
            Outcome::Failed(_) => "failed",
        }
    }

    /// Split into the payload for the host, or the middleware error.
    ///
    /// `Finished(None)` and `Next` both yield `Ok(None)`.
    pub fn into_body(self) -> Result<Option<ResponseBody>, BoxError> {
        match self {
            Outcome::Stream(stream) => Ok(Some(ResponseBody::Stream(stream))),
            Outcome::Buffered(bytes) | Outcome::Finished(Some(bytes)) => {
                Ok(Some(ResponseBody::Bytes(bytes)))
            }
            Outcome::Finished(None) | Outcome::Next => Ok(None),
            Outcome::Failed(err) => Err(err),
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Stream(_) => f.write_str("Stream(..)"),
            Outcome::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Outcome::Finished(data) => f
                .debug_tuple("Finished")
                .field(&data.as_ref().map(Bytes::len))
                .finish(),
            Outcome::Next => f.write_str("Next"),
            Outcome::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Write side of the cell, shared by all completion handles of a request.
pub(crate) struct Completion {
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Completion {
    pub(crate) fn channel() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let completion = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (completion, rx)
    }

    /// Resolve the cell. Returns `false` if it was already resolved.
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        let sender = self.sender.lock().take();
        match sender {
            Some(tx) => {
                // The receiver may be gone if the request was torn down
                let _ = tx.send(outcome);
                true
            }
            None => {
                tracing::debug!("ignoring {} after the request was already resolved", outcome.kind());
                false
            }
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }
}
