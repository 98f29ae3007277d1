//! Live-reload notifications over Server-Sent Events.
//!
//! Browsers load `/livereload.js`, which subscribes to `/livereload` and
//! either swaps stylesheets or reloads the page when an event arrives.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::State,
    http::header,
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
    routing::get,
};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tower_http::cors::{Any, CorsLayer};

const CLIENT_SCRIPT: &str = include_str!("../assets/livereload.js");

/// One notification. `path: None` asks clients to reload everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadEvent {
    pub path: Option<String>,
}

type ClientRegistry = Arc<RwLock<HashMap<usize, mpsc::Sender<String>>>>;

/// Connected live-reload clients. Cheap to clone; all clones share the
/// same registry.
#[derive(Debug, Clone, Default)]
pub struct LiveReload {
    clients: ClientRegistry,
    next_id: Arc<AtomicUsize>,
}

impl LiveReload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(100);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Tells clients that `path` (relative to the output root) changed.
    pub fn changed(&self, path: impl Into<String>) {
        self.broadcast(&ReloadEvent {
            path: Some(path.into()),
        });
    }

    /// Tells clients to reload the whole page.
    pub fn changed_all(&self) {
        self.broadcast(&ReloadEvent { path: None });
    }

    fn broadcast(&self, event: &ReloadEvent) {
        let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
        let clients = self.clients.read().clone();

        tracing::debug!("live-reload: {} -> {} clients", json, clients.len());

        let mut closed = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(json.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("live-reload client {} is lagging, event dropped", id);
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            self.unregister_client(id);
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/livereload", get(handle_events))
            .route("/livereload.js", get(handle_script))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self.clone())
    }
}

async fn handle_events(
    State(reload): State<LiveReload>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = reload.register_client();
    tracing::debug!(
        "live-reload client {} connected ({} total)",
        id,
        reload.client_count()
    );

    let stream =
        ReceiverStream::new(rx).map(|data| Ok(Event::default().event("reload").data(data)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

async fn handle_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_SCRIPT,
    )
}
