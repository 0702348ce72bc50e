#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::Router;
use parking_lot::Mutex;
use tally_sync::server::{self, ServerState};
use tally_sync::{CounterMap, Snapshot, SyncConfig, Transport};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

pub struct Service {
    pub addr: SocketAddr,
    pub state: ServerState,
    handle: JoinHandle<()>,
}

impl Service {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> SyncConfig {
        fast_config(&self.base_url())
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Run the in-memory counter service on an ephemeral port.
pub async fn spawn_service(state: ServerState) -> Result<Service> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn({
        let state = state.clone();
        async move {
            let _ = server::serve(listener, state).await;
        }
    });

    Ok(Service {
        addr,
        state,
        handle,
    })
}

/// Serve an arbitrary router on an ephemeral port.
pub async fn spawn_router(app: Router) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, handle))
}

pub fn fast_config(base: &str) -> SyncConfig {
    SyncConfig::new(base)
        .expect("valid base url")
        .with_request_timeout(Duration::from_secs(3))
        .with_poll_interval(Duration::from_millis(50))
        .with_reconnect_delay(Duration::from_millis(50))
}

pub fn websocket_only(config: SyncConfig) -> SyncConfig {
    config
        .with_transports(vec![Transport::WebSocket])
        .expect("non-empty transports")
}

pub fn counters(json: &str) -> CounterMap {
    serde_json::from_str(json).expect("valid counter map")
}

/// Snapshot collector usable as a subscription callback.
#[derive(Clone)]
pub struct Collector {
    seen: Arc<Mutex<Vec<Snapshot>>>,
    tx: mpsc::UnboundedSender<Snapshot>,
}

impl Collector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Snapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                tx,
            },
            rx,
        )
    }

    pub fn callback(&self) -> impl Fn(Snapshot) + Send + Sync + 'static {
        let seen = self.seen.clone();
        let tx = self.tx.clone();
        move |snapshot| {
            seen.lock().push(snapshot.clone());
            let _ = tx.send(snapshot);
        }
    }

    pub fn seen(&self) -> Vec<Snapshot> {
        self.seen.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }
}

/// Wait for the next snapshot satisfying `pred`.
pub async fn next_matching<F>(
    rx: &mut mpsc::UnboundedReceiver<Snapshot>,
    pred: F,
) -> Result<Snapshot>
where
    F: Fn(&CounterMap) -> bool,
{
    timeout(Duration::from_secs(5), async {
        while let Some(snapshot) = rx.recv().await {
            if pred(&snapshot) {
                return Ok(snapshot);
            }
        }
        Err(anyhow!("snapshot stream closed"))
    })
    .await?
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(check: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(5), async {
        while !check().await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("condition not reached in time"))
}
