use std::collections::BTreeMap;

use hist_diff::AttributeChange;
use hist_types::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute changes observed by the host, keyed by attribute name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, AttributeChange>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attribute whose raw value differs between two snapshots.
    /// Attributes missing on one side read as null.
    pub fn between(from: &Record, to: &Record) -> Self {
        let mut changes = Self::new();
        let names = from.attributes.keys().chain(to.attributes.keys());
        for name in names {
            let (old, new) = (from.get(name), to.get(name));
            if old != new {
                changes.insert(name.clone(), AttributeChange::new(old.clone(), new.clone()));
            }
        }
        changes
    }

    pub fn insert(&mut self, attribute: impl Into<String>, change: AttributeChange) -> &mut Self {
        self.0.insert(attribute.into(), change);
        self
    }

    pub fn with(mut self, attribute: impl Into<String>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        self.insert(attribute, AttributeChange::new(old, new));
        self
    }

    /// Keep only the attributes for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|attribute, _| keep(attribute));
    }

    pub fn get(&self, attribute: &str) -> Option<&AttributeChange> {
        self.0.get(attribute)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeChange)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, AttributeChange)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (K, AttributeChange)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
