//! Inclusion trees
//!
//! Callers name the relations to load eagerly as dot paths
//! (`"schedules.venue"`). The paths collapse into a tree keyed by relation
//! name; siblings sharing a prefix are merged.

use std::collections::BTreeMap;

/// Relation name -> nested inclusion tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Withs(BTreeMap<String, Withs>);

impl Withs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of dot-separated relation paths.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut withs = Self::new();
        for path in paths {
            withs.insert_path(path.as_ref());
        }
        withs
    }

    /// Add one path, merging with whatever is already present.
    pub fn insert_path(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            node = node.0.entry(segment.to_string()).or_default();
        }
    }

    /// Nested tree for a relation, if that relation is included.
    pub fn get(&self, relation: &str) -> Option<&Withs> {
        self.0.get(relation)
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.0.contains_key(relation)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
