use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::gateway::RemoteGateway;
use super::protocol::decode_update;
use crate::config::Transport;
use crate::counters::Snapshot;
use crate::error::Result;

type Callback = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// One live connection to the service's broadcast stream.
///
/// A background task negotiates the configured transports in preference
/// order and hands every pushed snapshot to the callback. Closing (or
/// dropping) the channel aborts that task.
pub struct PushChannel {
    task: JoinHandle<()>,
}

impl PushChannel {
    /// Spawn the connection task. Must be called inside a tokio runtime.
    pub fn open<F>(gateway: RemoteGateway, on_snapshot: F) -> Self
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(on_snapshot);
        let task = tokio::spawn(run(gateway, callback));
        Self { task }
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Abort the connection task and wait until it is gone; no callback
    /// runs after this returns.
    pub async fn close(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(gateway: RemoteGateway, callback: Callback) {
    let config = gateway.config().clone();

    loop {
        for transport in &config.transports {
            match transport {
                Transport::WebSocket => match stream_updates(&gateway, &callback).await {
                    Ok(()) => {
                        debug!("push stream ended, reconnecting");
                        break;
                    }
                    Err(err) => {
                        debug!(error = %err, "websocket transport unavailable");
                    }
                },
                Transport::Polling => {
                    // Polling never ends on its own; it is the last resort.
                    poll_updates(&gateway, &callback).await;
                }
            }
        }

        sleep(config.reconnect_delay).await;
    }
}

/// Connect and forward `updateWords` frames until the stream closes.
/// Only a failed connect is an error; a dropped stream returns `Ok`.
async fn stream_updates(gateway: &RemoteGateway, callback: &Callback) -> Result<()> {
    let url = gateway.config().push_url()?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    debug!(%url, "push stream connected");

    let (_ws_tx, mut ws_rx) = ws_stream.split();

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => deliver_frame(text.as_str(), callback),
            Ok(Message::Binary(bin)) => match std::str::from_utf8(&bin) {
                Ok(text) => deliver_frame(text, callback),
                Err(_) => warn!(len = bin.len(), "ignoring non-utf8 binary push frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Err(err) => {
                warn!(error = %err, "push stream failed");
                break;
            }
        }
    }

    Ok(())
}

fn deliver_frame(text: &str, callback: &Callback) {
    match decode_update(text) {
        Ok(Some(counters)) => callback(counters.into_snapshot()),
        Ok(None) => debug!("ignoring push event"),
        Err(err) => warn!(error = %err, "ignoring malformed push frame"),
    }
}

/// Fallback transport: re-read the full map on an interval and deliver it
/// whenever it differs from the previous poll.
async fn poll_updates(gateway: &RemoteGateway, callback: &Callback) {
    let mut ticker = interval(gateway.config().poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<Snapshot> = None;

    debug!("falling back to polling transport");
    loop {
        ticker.tick().await;
        match gateway.fetch_all().await {
            Ok(snapshot) => {
                if last.as_deref() != Some(&*snapshot) {
                    last = Some(snapshot.clone());
                    callback(snapshot);
                }
            }
            Err(err) => warn!(error = %err, "poll failed"),
        }
    }
}
