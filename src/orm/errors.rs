//! Error types for the ORM layer
//!
//! Two kinds of failure exist side by side:
//! - [`OrmError`] is returned by read operations and relation loads.
//! - [`ErrorSet`] collects per-field messages during save/validate/delete,
//!   which report a plain `false` instead of an error.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

/// Key under which database failures are recorded.
pub const DATABASE_KEY: &str = "Database";

/// Key under which hook rejections without a specific message are recorded.
pub const VALIDATION_KEY: &str = "validation";

#[derive(Debug, Error)]
pub enum OrmError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("unknown entity type '{0}'")]
    UnknownEntity(String),

    #[error("entity '{entity}' has no relation named '{relation}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("invalid metadata for '{entity}': {reason}")]
    InvalidMetadata { entity: String, reason: String },

    #[error("unexpected query output, expected {0}")]
    UnexpectedOutput(&'static str),
}

/// Messages recorded during one save/validate/delete call, keyed by field
/// name or by [`DATABASE_KEY`]/[`VALIDATION_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorSet(BTreeMap<String, Vec<String>>);

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message for a field, keeping insertion order per field.
    pub fn add(&mut self, field: impl Into<String>, message: impl fmt::Display) {
        self.0
            .entry(field.into())
            .or_default()
            .push(message.to_string());
    }

    /// Record a failure reported by the database collaborator.
    pub fn add_database(&mut self, message: impl fmt::Display) {
        self.add(DATABASE_KEY, message);
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn has_errors(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}
