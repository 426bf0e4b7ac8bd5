//! Build state shared by the dev middleware and published to requests.

use crate::compiler::{Stats, Watching};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Default)]
struct State {
    valid: bool,
    closed: bool,
    stats: Option<Arc<Stats>>,
    callbacks: Vec<oneshot::Sender<Arc<Stats>>>,
}

/// Validity of the latest compilation and the requests waiting for it.
///
/// Starts invalid; the compiler's `done` hook makes it valid and releases the
/// waiting requests, `invalid` makes it invalid again. Once closed, no
/// request waits.
#[derive(Default)]
pub struct DevMiddlewareContext {
    state: Mutex<State>,
    watching: Mutex<Option<Watching>>,
}

impl DevMiddlewareContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Stats of the latest finished compilation.
    pub fn stats(&self) -> Option<Arc<Stats>> {
        self.state.lock().stats.clone()
    }

    /// Number of requests waiting for a compilation to finish.
    pub fn pending(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    pub(crate) fn invalidate(&self) {
        let mut state = self.state.lock();
        if state.valid {
            tracing::info!("wait until bundle finished");
        }
        state.valid = false;
    }

    pub(crate) fn done(&self, stats: Arc<Stats>) {
        let callbacks = {
            let mut state = self.state.lock();
            state.valid = true;
            state.stats = Some(Arc::clone(&stats));
            std::mem::take(&mut state.callbacks)
        };

        if stats.has_errors() {
            tracing::error!("Failed to compile ({} errors)", stats.errors.len());
        } else if stats.has_warnings() {
            tracing::warn!("Compiled with {} warnings", stats.warnings.len());
        } else {
            tracing::info!("Compiled successfully in {}ms", stats.time_ms);
        }

        for callback in callbacks {
            let _ = callback.send(Arc::clone(&stats));
        }
    }

    /// Resolve with the stats once the current compilation is valid.
    ///
    /// Returns `None` if the context is closed before that happens, or
    /// already was.
    pub async fn wait_until_valid(&self) -> Option<Arc<Stats>> {
        let rx = {
            let mut state = self.state.lock();
            if state.closed {
                return None;
            }
            if state.valid {
                return state.stats.clone();
            }
            tracing::debug!("wait until bundle finished");
            let (tx, rx) = oneshot::channel();
            state.callbacks.push(tx);
            rx
        };
        rx.await.ok()
    }

    pub(crate) fn set_watching(&self, watching: Watching) {
        *self.watching.lock() = Some(watching);
    }

    /// Stop watching and release waiting requests.
    pub(crate) fn close(&self) {
        if let Some(watching) = self.watching.lock().take() {
            watching.close();
        }
        let mut state = self.state.lock();
        state.closed = true;
        state.callbacks.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl fmt::Debug for DevMiddlewareContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DevMiddlewareContext")
            .field("valid", &state.valid)
            .field("closed", &state.closed)
            .field("hash", &state.stats.as_ref().map(|s| s.hash.as_str()))
            .field("pending", &state.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(hash: &str) -> Arc<Stats> {
        Arc::new(Stats {
            hash: hash.to_string(),
            ..Stats::default()
        })
    }

    #[tokio::test]
    async fn test_waiters_released_on_done() {
        let context = Arc::new(DevMiddlewareContext::new());
        let waiter = {
            let context = Arc::clone(&context);
            tokio::spawn(async move { context.wait_until_valid().await })
        };

        while context.pending() == 0 {
            tokio::task::yield_now().await;
        }
        context.done(stats("abc"));

        let stats = waiter.await.unwrap().unwrap();
        assert_eq!(stats.hash, "abc");
        assert_eq!(context.pending(), 0);
    }

    #[tokio::test]
    async fn test_valid_context_answers_immediately() {
        let context = DevMiddlewareContext::new();
        context.done(stats("abc"));

        assert!(context.is_valid());
        assert_eq!(context.wait_until_valid().await.unwrap().hash, "abc");
    }

    #[tokio::test]
    async fn test_invalidate_keeps_previous_stats() {
        let context = DevMiddlewareContext::new();
        context.done(stats("abc"));
        context.invalidate();

        assert!(!context.is_valid());
        assert_eq!(context.stats().unwrap().hash, "abc");
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let context = Arc::new(DevMiddlewareContext::new());
        let waiter = {
            let context = Arc::clone(&context);
            tokio::spawn(async move { context.wait_until_valid().await })
        };

        while context.pending() == 0 {
            tokio::task::yield_now().await;
        }
        context.close();

        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wait_after_close_returns_immediately() {
        let context = DevMiddlewareContext::new();
        context.close();
        context.invalidate();

        assert!(context.is_closed());
        assert!(context.wait_until_valid().await.is_none());
        assert_eq!(context.pending(), 0);
    }
}
