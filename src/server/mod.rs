//! In-memory counter service speaking the same contract as the remote one
//!
//! Used by the integration tests and by `tally serve`. Nothing is persisted.

pub mod api;

use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

pub use api::{router, ServerState};

pub async fn start(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    serve(listener, ServerState::new()).await
}

/// Serve on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "counter service listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
