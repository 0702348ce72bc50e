use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::bus::{EchoBus, ListenerId, LOCAL_UPDATE_EVENT};
use super::gateway::RemoteGateway;
use super::push::PushChannel;
use crate::config::SyncConfig;
use crate::counters::{CounterName, MutationKind, Snapshot};
use crate::error::Result;

/// Entry point for the presentation layer: mutations, full reads and a
/// merged snapshot subscription.
#[derive(Clone)]
pub struct CounterSync {
    gateway: RemoteGateway,
}

impl CounterSync {
    /// Build a facade with its own echo bus.
    pub fn new(config: SyncConfig) -> Result<Self> {
        Self::with_bus(config, EchoBus::new())
    }

    /// Build a facade publishing on a shared echo bus.
    pub fn with_bus(config: SyncConfig, bus: EchoBus) -> Result<Self> {
        let gateway = RemoteGateway::new(Arc::new(config), bus)?;
        Ok(Self { gateway })
    }

    pub fn from_gateway(gateway: RemoteGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &RemoteGateway {
        &self.gateway
    }

    pub fn bus(&self) -> &EchoBus {
        self.gateway.bus()
    }

    /// Full read; safe to call at any time to reconcile.
    pub async fn fetch_all(&self) -> Result<Snapshot> {
        self.gateway.fetch_all().await
    }

    /// Apply one mutation. Failures propagate; the core never retries.
    pub async fn mutate(&self, kind: MutationKind, name: &CounterName) -> Result<()> {
        self.gateway.mutate(kind, name).await
    }

    /// Register `on_snapshot` against both the local echo bus and a fresh
    /// push connection.
    ///
    /// The echo listener is registered before this returns, so any
    /// mutation started afterwards reaches the callback even if the push
    /// stream never delivers. The callback may fire any number of times in
    /// any order; apply each snapshot as a full replacement.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, since the push
    /// connection runs on a spawned task.
    pub fn subscribe<F>(&self, on_snapshot: F) -> Subscription
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        let delivery = Delivery {
            callback: Arc::new(on_snapshot),
            released: Arc::new(AtomicBool::new(false)),
        };

        let echo = delivery.clone();
        let listener = self
            .bus()
            .add_listener(LOCAL_UPDATE_EVENT, move |snapshot| echo.deliver(snapshot.clone()));

        let pushed = delivery.clone();
        let push = PushChannel::open(self.gateway.clone(), move |snapshot| pushed.deliver(snapshot));

        debug!(subscription = %id.0, "subscription active");
        Subscription {
            id,
            bus: self.bus().clone(),
            listener,
            released: delivery.released,
            push: Some(push),
        }
    }
}

#[derive(Clone)]
struct Delivery {
    callback: Arc<dyn Fn(Snapshot) + Send + Sync>,
    released: Arc<AtomicBool>,
}

impl Delivery {
    fn deliver(&self, snapshot: Snapshot) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        (self.callback)(snapshot);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Teardown handle for one [`CounterSync::subscribe`] registration.
///
/// Release it with [`Subscription::unsubscribe`], which waits for the push
/// connection to stop. Dropping the handle releases it too, without waiting.
pub struct Subscription {
    id: SubscriptionId,
    bus: EchoBus,
    listener: ListenerId,
    released: Arc<AtomicBool>,
    push: Option<PushChannel>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Release both registrations. Once this resolves no further callback
    /// is started by either channel.
    pub async fn unsubscribe(mut self) {
        if let Some(push) = self.release() {
            push.close().await;
        }
        debug!(subscription = %self.id, "subscription released");
    }

    // Listener goes first; the connection is closed by the caller.
    fn release(&mut self) -> Option<PushChannel> {
        if self.released.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.bus.remove_listener(LOCAL_UPDATE_EVENT, self.listener);
        self.push.take()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // PushChannel's own Drop aborts the connection task.
        drop(self.release());
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn subscribe_needs_a_runtime() {
        let sync = CounterSync::new(SyncConfig::new("http://127.0.0.1:9").unwrap()).unwrap();
        let _subscription = sync.subscribe(|_| {});
    }

    #[tokio::test]
    async fn subscription_ids_are_unique_and_release_once() {
        let sync = CounterSync::new(SyncConfig::new("http://127.0.0.1:9").unwrap()).unwrap();
        let first = sync.subscribe(|_| {});
        let second = sync.subscribe(|_| {});
        assert_ne!(first.id(), second.id());
        assert_eq!(sync.bus().listener_count(LOCAL_UPDATE_EVENT), 2);

        first.unsubscribe().await;
        assert_eq!(sync.bus().listener_count(LOCAL_UPDATE_EVENT), 1);
        drop(second);
        assert_eq!(sync.bus().listener_count(LOCAL_UPDATE_EVENT), 0);
    }
}
