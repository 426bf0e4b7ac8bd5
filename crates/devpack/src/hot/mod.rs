//! Hot-update event channel.
//!
//! Browsers running the hot client keep an event stream open on the channel
//! path. Every client receives:
//! - `{"action":"sync",...}` with the latest stats when it connects
//! - `{"action":"building"}` when a watched file changes
//! - `{"action":"built",...}` after each compilation
//! - a heartbeat frame every heartbeat interval

use crate::compiler::{Compiler, Stats};
use crate::host::{BodyStream, RequestHead};
use crate::legacy::{LegacyMiddleware, LegacyResponse, Next};
use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use devpack_config::{DEFAULT_HEARTBEAT_MS, DEFAULT_HMR_PATH};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

const HEARTBEAT_FRAME: &[u8] = "data: \u{1F493}\n\n".as_bytes();

/// Buffered messages per client before new ones are dropped.
const CLIENT_BUFFER: usize = 100;

/// Hot middleware settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotMiddlewareOptions {
    /// Request path of the event channel
    pub path: String,
    /// Interval between heartbeat frames on an idle channel
    pub heartbeat: Duration,
}

impl Default for HotMiddlewareOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_HMR_PATH.to_string(),
            heartbeat: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
        }
    }
}

/// Message pushed to hot clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum HotPayload {
    /// A watched file changed; a compilation is starting
    Building,
    /// A compilation finished
    Built(BuildSummary),
    /// Latest compilation, sent once to a newly connected client
    Sync(BuildSummary),
}

/// Compilation result as the hot client sees it.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    /// Compilation time in milliseconds
    pub time: u64,
    /// Compilation hash; the client requests `<hash>.hot-update.json`
    pub hash: String,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Module id -> module name
    pub modules: BTreeMap<usize, String>,
}

impl From<&Stats> for BuildSummary {
    fn from(stats: &Stats) -> Self {
        Self {
            time: stats.time_ms,
            hash: stats.hash.clone(),
            warnings: stats.warnings.clone(),
            errors: stats.errors.clone(),
            modules: stats
                .modules
                .iter()
                .map(|m| (m.id, m.name.clone()))
                .collect(),
        }
    }
}

struct Inner {
    options: HotMiddlewareOptions,
    /// Connected clients by id
    clients: RwLock<HashMap<usize, mpsc::Sender<String>>>,
    next_client_id: RwLock<usize>,
    /// Stats of the latest compilation, sent as `sync` to new clients
    latest: RwLock<Option<Arc<Stats>>>,
}

impl Inner {
    fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = {
            let mut next_id = self.next_client_id.write();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    fn unregister_client(&self, id: usize) {
        if self.clients.write().remove(&id).is_some() {
            tracing::debug!("hot-update client {} disconnected", id);
        }
    }

    fn publish(&self, payload: &HotPayload) {
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize hot-update payload: {}", e);
                return;
            }
        };

        let clients = self.clients.read().clone();
        let mut closed = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(json.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("hot-update client {} is not reading, dropping message", id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            self.unregister_client(id);
        }
    }
}

/// Removes its client from the registry when the event stream is dropped.
struct ClientGuard {
    inner: Weak<Inner>,
    id: usize,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.unregister_client(self.id);
        }
    }
}

/// Legacy middleware serving the hot-update channel.
#[derive(Clone)]
pub struct HotMiddleware {
    inner: Arc<Inner>,
}

impl HotMiddleware {
    /// Subscribe to `compiler` and broadcast its build events.
    pub fn new(compiler: &Compiler, options: HotMiddlewareOptions) -> Self {
        let inner = Arc::new(Inner {
            options,
            clients: RwLock::new(HashMap::new()),
            next_client_id: RwLock::new(0),
            latest: RwLock::new(compiler.stats()),
        });

        let weak = Arc::downgrade(&inner);
        compiler.hooks().on_invalid(move |_changed| {
            if let Some(inner) = weak.upgrade() {
                tracing::debug!("webpack building...");
                inner.publish(&HotPayload::Building);
            }
        });

        let weak = Arc::downgrade(&inner);
        compiler.hooks().on_done(move |stats| {
            if let Some(inner) = weak.upgrade() {
                *inner.latest.write() = Some(Arc::clone(stats));
                tracing::debug!("webpack built {} in {}ms", stats.hash, stats.time_ms);
                inner.publish(&HotPayload::Built(BuildSummary::from(stats.as_ref())));
            }
        });

        Self { inner }
    }

    pub fn path(&self) -> &str {
        &self.inner.options.path
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Send a payload to every connected client.
    pub fn publish(&self, payload: &HotPayload) {
        self.inner.publish(payload);
    }

    /// Disconnect every client.
    pub fn close(&self) {
        self.inner.clients.write().clear();
    }

    fn event_stream(&self) -> BodyStream {
        let (id, mut rx) = self.inner.register_client();
        let guard = ClientGuard {
            inner: Arc::downgrade(&self.inner),
            id,
        };

        let sync = self
            .inner
            .latest
            .read()
            .as_ref()
            .map(|stats| HotPayload::Sync(BuildSummary::from(stats.as_ref())))
            .and_then(|payload| serde_json::to_string(&payload).ok());
        let heartbeat = self.inner.options.heartbeat;

        Box::pin(async_stream::stream! {
            let _guard = guard;

            if let Some(sync) = sync {
                yield Ok::<_, std::io::Error>(data_frame(&sync));
            }

            let start = tokio::time::Instant::now() + heartbeat;
            let mut ticker = tokio::time::interval_at(start, heartbeat);
            loop {
                let frame = tokio::select! {
                    message = rx.recv() => match message {
                        Some(data) => data_frame(&data),
                        None => break,
                    },
                    _ = ticker.tick() => Bytes::from_static(HEARTBEAT_FRAME),
                };
                yield Ok(frame);
            }
        })
    }
}

fn data_frame(data: &str) -> Bytes {
    Bytes::from(format!("data: {data}\n\n"))
}

impl LegacyMiddleware for HotMiddleware {
    fn call(&self, req: RequestHead, res: LegacyResponse, next: Next) {
        if req.path() != self.inner.options.path {
            next.pass();
            return;
        }

        res.set_status(StatusCode::OK);
        res.set_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream;charset=utf-8"),
        );
        res.set_header(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-transform"),
        );
        res.set_header(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );

        res.stream(self.event_stream());
        tracing::info!("hot-update client connected ({} total)", self.client_count());
    }
}
