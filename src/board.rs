//! Displayed counter state for terminal front-ends
//!
//! The board is what a presentation layer keeps between snapshots:
//! the last applied map plus any optimistic edits made since. Every
//! incoming snapshot replaces the whole map, so applying a duplicate
//! delivery is harmless.

use chrono::{DateTime, Utc};

use crate::counters::{CounterMap, CounterName, Snapshot};

#[derive(Debug, Clone)]
pub struct CounterBoard {
    counters: CounterMap,
    loading: bool,
    last_synced: Option<DateTime<Utc>>,
}

impl Default for CounterBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterBoard {
    /// Empty board, marked as loading until the first snapshot arrives.
    pub fn new() -> Self {
        Self {
            counters: CounterMap::new(),
            loading: true,
            last_synced: None,
        }
    }

    /// Replace the displayed map with `snapshot` (latest write wins).
    pub fn apply(&mut self, snapshot: &Snapshot) {
        self.counters = CounterMap::clone(snapshot);
        self.loading = false;
        self.last_synced = Some(Utc::now());
    }

    /// Show an increment before the service confirms it.
    pub fn optimistic_increment(&mut self, name: &CounterName) -> u64 {
        self.counters.increment_or_insert(name.clone())
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn counters(&self) -> &CounterMap {
        &self.counters
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    /// `(name, count)` rows in display order.
    pub fn rows(&self) -> Vec<(String, u64)> {
        self.counters
            .iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect()
    }
}
