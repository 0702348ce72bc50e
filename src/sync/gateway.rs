use std::sync::Arc;

use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, warn};

use super::bus::{EchoBus, LOCAL_UPDATE_EVENT};
use crate::config::SyncConfig;
use crate::counters::{CounterMap, CounterName, MutationKind, Snapshot};
use crate::error::{Result, SyncError};

#[derive(Serialize)]
struct AddRequest<'a> {
    name: &'a str,
}

/// Request/response boundary to the remote counter service.
///
/// Holds no counter state. Every successful mutation is confirmed by a
/// full re-read whose result is published on the [`EchoBus`].
#[derive(Clone)]
pub struct RemoteGateway {
    client: Client,
    config: Arc<SyncConfig>,
    bus: EchoBus,
}

impl RemoteGateway {
    pub fn new(config: Arc<SyncConfig>, bus: EchoBus) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::network("build_client", e))?;

        Ok(Self::with_client(client, config, bus))
    }

    pub fn with_client(client: Client, config: Arc<SyncConfig>, bus: EchoBus) -> Self {
        Self { client, config, bus }
    }

    pub fn config(&self) -> &Arc<SyncConfig> {
        &self.config
    }

    pub fn bus(&self) -> &EchoBus {
        &self.bus
    }

    /// Fetch the full counter map.
    pub async fn fetch_all(&self) -> Result<Snapshot> {
        const OP: &str = "fetch_all";

        let response = self
            .client
            .get(self.config.all_url())
            .send()
            .await
            .map_err(|e| SyncError::network(OP, e))?;
        let response = check_status(OP, response).await?;
        let body = response.bytes().await.map_err(|e| SyncError::network(OP, e))?;

        let counters: CounterMap = serde_json::from_slice(&body)?;
        Ok(counters.into_snapshot())
    }

    pub async fn increment_counter(&self, name: &CounterName) -> Result<()> {
        const OP: &str = "increment_counter";

        let url = self.config.increment_url(name)?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| SyncError::network(OP, e))?;
        check_status(OP, response).await?;

        debug!(counter = %name, "increment accepted");
        self.resync(OP).await;
        Ok(())
    }

    pub async fn add_counter(&self, name: &CounterName) -> Result<()> {
        const OP: &str = "add_counter";

        let response = self
            .client
            .post(self.config.add_url())
            .json(&AddRequest { name: name.as_str() })
            .send()
            .await
            .map_err(|e| SyncError::network(OP, e))?;
        check_status(OP, response).await?;

        debug!(counter = %name, "add accepted");
        self.resync(OP).await;
        Ok(())
    }

    pub async fn mutate(&self, kind: MutationKind, name: &CounterName) -> Result<()> {
        match kind {
            MutationKind::Increment => self.increment_counter(name).await,
            MutationKind::AddCounter => self.add_counter(name).await,
        }
    }

    /// Re-read after a successful write and echo the result locally. The
    /// write already happened, so a failed re-read is only logged; the
    /// push channel will carry the state eventually.
    async fn resync(&self, operation: &'static str) {
        match self.fetch_all().await {
            Ok(snapshot) => {
                let delivered = self.bus.publish(LOCAL_UPDATE_EVENT, &snapshot);
                debug!(operation, delivered, counters = snapshot.len(), "local echo published");
            }
            Err(err) => {
                let err = SyncError::local_sync(operation, err);
                warn!(error = %err, "skipping local echo");
            }
        }
    }
}

async fn check_status(operation: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Server {
        operation,
        status,
        body,
    })
}
