use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Full known counter state at one instant. Shared, never mutated after
/// delivery.
pub type Snapshot = Arc<CounterMap>;

/// Non-empty counter name.
///
/// [`CounterName::new`] is the input-side constructor and also rejects
/// whitespace-only names. Names decoded from the service only have to be
/// non-empty, so a map holding `" "` still decodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CounterName(String);

impl CounterName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SyncError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CounterName {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        if value.is_empty() {
            return Err(SyncError::InvalidName(value));
        }
        Ok(Self(value))
    }
}

impl From<CounterName> for String {
    fn from(name: CounterName) -> Self {
        name.0
    }
}

impl Borrow<str> for CounterName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from counter name to its count, exchanged as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterMap(BTreeMap<CounterName, u64>);

impl CounterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &CounterName) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CounterName, u64)> {
        self.0.iter().map(|(name, count)| (name, *count))
    }

    /// Register `name` at zero. An existing counter keeps its count.
    /// Returns `true` when the name was new.
    pub fn add(&mut self, name: CounterName) -> bool {
        let mut inserted = false;
        self.0.entry(name).or_insert_with(|| {
            inserted = true;
            0
        });
        inserted
    }

    /// Bump an existing counter, returning the new count.
    pub fn increment(&mut self, name: &CounterName) -> Option<u64> {
        let count = self.0.get_mut(name)?;
        *count = count.saturating_add(1);
        Some(*count)
    }

    /// Bump `name`, creating it at one when absent.
    pub fn increment_or_insert(&mut self, name: CounterName) -> u64 {
        let count = self.0.entry(name).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn into_snapshot(self) -> Snapshot {
        Arc::new(self)
    }
}

impl FromIterator<(CounterName, u64)> for CounterMap {
    fn from_iter<I: IntoIterator<Item = (CounterName, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The two mutation entry points exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Increment,
    AddCounter,
}

impl MutationKind {
    pub fn label(&self) -> &'static str {
        match self {
            MutationKind::Increment => "increment_counter",
            MutationKind::AddCounter => "add_counter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> CounterName {
        CounterName::new(s).unwrap()
    }

    #[test]
    fn rejects_blank_names() {
        assert!(matches!(CounterName::new(""), Err(SyncError::InvalidName(_))));
        assert!(matches!(CounterName::new("  \t"), Err(SyncError::InvalidName(_))));
        assert_eq!(name("apple pie").as_str(), "apple pie");
    }

    #[test]
    fn decodes_service_payload() {
        let map: CounterMap = serde_json::from_str(r#"{"banana": 5, "apple": 0}"#).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("banana"), Some(5));
        assert_eq!(map.get("cherry"), None);

        let names: Vec<_> = map.iter().map(|(n, _)| n.as_str().to_string()).collect();
        assert_eq!(names, vec!["apple", "banana"]);
    }

    #[test]
    fn rejects_negative_counts_and_empty_keys() {
        assert!(serde_json::from_str::<CounterMap>(r#"{"apple": -1}"#).is_err());
        assert!(serde_json::from_str::<CounterMap>(r#"{"": 1}"#).is_err());
    }

    #[test]
    fn decodes_whitespace_keys_from_the_service() {
        let map: CounterMap = serde_json::from_str(r#"{" ":3,"apple":1}"#).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(" "), Some(3));
        assert_eq!(map.get("apple"), Some(1));

        // Typed input is still stricter than decoded payloads.
        assert!(CounterName::new(" ").is_err());
    }

    #[test]
    fn add_keeps_existing_count() {
        let mut map = CounterMap::new();
        assert!(map.add(name("apple")));
        assert_eq!(map.increment(&name("apple")), Some(1));
        assert!(!map.add(name("apple")));
        assert_eq!(map.get("apple"), Some(1));
        assert_eq!(map.increment(&name("missing")), None);
        assert_eq!(map.increment_or_insert(name("missing")), 1);
    }
}
