use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::counters::Snapshot;

/// Event published after a mutation's confirming re-read.
pub const LOCAL_UPDATE_EVENT: &str = "updateCountersLocal";

/// Identifies one listener registration on an [`EchoBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

type Handler = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// In-process named-event publish/subscribe registry for snapshots.
///
/// Cloning the bus shares the registry. Handlers run synchronously on the
/// publishing task, after the registry lock has been released, so a
/// handler may register or remove listeners (or spawn work that
/// publishes again) without deadlocking.
#[derive(Clone, Default)]
pub struct EchoBus {
    listeners: Arc<DashMap<String, Vec<(ListenerId, Handler)>>>,
}

impl std::fmt::Debug for EchoBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoBus")
            .field("events", &self.listeners.len())
            .finish()
    }
}

impl EchoBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let id = ListenerId(Uuid::new_v4());
        let handler: Handler = Arc::new(handler);
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut removed = false;
        if let Some(mut handlers) = self.listeners.get_mut(event) {
            let before = handlers.len();
            handlers.retain(|(listener, _)| *listener != id);
            removed = handlers.len() != before;
        }
        self.listeners.remove_if(event, |_, handlers| handlers.is_empty());
        removed
    }

    /// Deliver `snapshot` to every listener of `event`, returning how many
    /// were invoked. Publishing to an event nobody listens to is a no-op.
    pub fn publish(&self, event: &str, snapshot: &Snapshot) -> usize {
        let handlers: Vec<Handler> = match self.listeners.get(event) {
            Some(registered) => registered.iter().map(|(_, h)| h.clone()).collect(),
            None => return 0,
        };

        for handler in &handlers {
            handler(snapshot);
        }
        handlers.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|h| h.len()).unwrap_or(0)
    }
}
