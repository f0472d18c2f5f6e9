//! Database access
//!
//! The ORM talks to storage only through [`DatabaseAccess`]: it hands over a
//! [`Query`] and gets back rows, a generated id, or an affected-row count.
//! The SQLite adapter in [`sqlite`] is the default implementation.

pub mod criteria;
pub mod query;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::orm::Value;

pub use criteria::{Criteria, Operator};
pub use query::{Join, JoinKind, Order, Query, QueryKind, SortDirection, order_by_clause};
#[cfg(feature = "sqlite")]
pub use sqlite::Database;

/// One result row: column name -> raw value.
pub type RawRow = BTreeMap<String, Value>;

/// Failure reported by the database collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DbError {
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // Keep the driver's message without the "error returned from database" prefix
            sqlx::Error::Database(db_err) => Self::new(db_err.message()),
            other => Self::new(other.to_string()),
        }
    }
}

/// Result of executing a [`Query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// SELECT: rows in the order the database returned them
    Rows(Vec<RawRow>),
    /// INSERT: generated primary key
    Inserted { last_insert_id: i64 },
    /// UPDATE/DELETE: number of rows touched
    Affected(u64),
}

impl QueryOutput {
    pub fn into_rows(self) -> Option<Vec<RawRow>> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

/// The storage collaborator used by repositories and relation loaders.
#[async_trait]
pub trait DatabaseAccess: Send + Sync {
    /// Execute a query intent.
    async fn execute(&self, query: &Query) -> Result<QueryOutput, DbError>;

    /// Canonical form of a value under this database's coercion rules.
    /// Two values with equal normalized forms are considered unchanged.
    fn normalize(&self, value: &Value) -> String {
        value.normalized()
    }
}
