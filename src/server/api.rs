use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::counters::{CounterMap, CounterName, Snapshot};
use crate::sync::PushMessage;

/// Shared state of the in-memory counter service.
#[derive(Clone)]
pub struct ServerState {
    counters: Arc<RwLock<CounterMap>>,
    updates: broadcast::Sender<Snapshot>,
    broadcast_writes: bool,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self::with_counters(CounterMap::new())
    }

    pub fn with_counters(counters: CounterMap) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            counters: Arc::new(RwLock::new(counters)),
            updates,
            broadcast_writes: true,
        }
    }

    /// Stop looping writes back over the push stream. Explicit
    /// [`ServerState::broadcast`] calls still go out.
    pub fn without_write_broadcast(mut self) -> Self {
        self.broadcast_writes = false;
        self
    }

    pub fn snapshot(&self) -> Snapshot {
        self.counters.read().clone().into_snapshot()
    }

    /// Push `snapshot` to every connected client. Returns the number of
    /// connections it was queued for.
    pub fn broadcast(&self, snapshot: Snapshot) -> usize {
        self.updates.send(snapshot).unwrap_or(0)
    }

    /// Number of live push connections.
    pub fn push_clients(&self) -> usize {
        self.updates.receiver_count()
    }

    fn written(&self) {
        if self.broadcast_writes {
            let delivered = self.broadcast(self.snapshot());
            debug!(delivered, "broadcast counter update");
        }
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(|| async { "Tally counter service" }))
        .route("/health", get(|| async { Json("OK") }))
        .route("/all", get(get_all))
        .route("/increment/{name}", post(increment))
        .route("/add", post(add))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_all(State(state): State<ServerState>) -> Json<CounterMap> {
    Json(CounterMap::clone(&state.snapshot()))
}

async fn increment(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let name = CounterName::new(name).map_err(|_| StatusCode::BAD_REQUEST)?;
    let count = state
        .counters
        .write()
        .increment(&name)
        .ok_or(StatusCode::NOT_FOUND)?;

    debug!(counter = %name, count, "incremented");
    state.written();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AddRequest {
    name: String,
}

async fn add(
    State(state): State<ServerState>,
    Json(request): Json<AddRequest>,
) -> Result<StatusCode, StatusCode> {
    let name = CounterName::new(request.name).map_err(|_| StatusCode::BAD_REQUEST)?;
    let created = state.counters.write().add(name.clone());

    debug!(counter = %name, created, "added");
    state.written();
    Ok(if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    })
}

async fn ws_handler(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl axum::response::IntoResponse {
    // Subscribe before the upgrade completes so `push_clients` counts
    // this connection as soon as the handshake is answered.
    let rx = state.updates.subscribe();
    ws.on_upgrade(move |socket| handle_ws(rx, socket))
}

async fn handle_ws(mut rx: broadcast::Receiver<Snapshot>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    let text = match PushMessage::update(&snapshot)
                        .and_then(|m| serde_json::to_string(&m).map_err(Into::into))
                    {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(error = %err, "failed to encode counter update");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "push client lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Clients only listen; drain until they go away.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    send_task.abort();
}
