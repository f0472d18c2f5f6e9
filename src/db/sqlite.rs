//! SQLite adapter
//!
//! [`Database`] wraps a sqlx `SqlitePool` and implements [`DatabaseAccess`].
//! Rows are decoded dynamically by storage class since entity types are only
//! known at runtime.

use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};

use super::{DatabaseAccess, DbError, Query, QueryKind, QueryOutput, RawRow};
use crate::config::Config;
use crate::orm::{DATE_FORMAT, Value};

/// Database wrapper providing connection pool access
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        tracing::debug!(url = %url, max_connections, "Database connected");
        Ok(Self { pool })
    }

    /// Connect using the configured URL and pool size
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::connect(&config.database_url, config.max_connections).await
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DatabaseAccess for Database {
    async fn execute(&self, query: &Query) -> Result<QueryOutput, DbError> {
        let (sql, values) = query.to_sql();
        tracing::debug!(sql = %sql, binds = values.len(), "Executing query");

        let mut statement = sqlx::query(&sql);
        for value in &values {
            statement = bind_value(statement, value);
        }

        match query.kind() {
            QueryKind::Select => {
                let rows = statement.fetch_all(&self.pool).await?;
                Ok(QueryOutput::Rows(rows.iter().map(decode_row).collect()))
            }
            QueryKind::Insert => {
                let result = statement.execute(&self.pool).await?;
                Ok(QueryOutput::Inserted {
                    last_insert_id: result.last_insert_rowid(),
                })
            }
            QueryKind::Update | QueryKind::Delete => {
                let result = statement.execute(&self.pool).await?;
                Ok(QueryOutput::Affected(result.rows_affected()))
            }
        }
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a value to a sqlx query builder
fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.as_str()),
        Value::Date(date) => query.bind(date.format(DATE_FORMAT).to_string()),
        Value::Json(json) => query.bind(json.to_string()),
    }
}

/// Convert a SQLite row to a column -> value map.
fn decode_row(row: &SqliteRow) -> RawRow {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            (column.name().to_string(), decode_column(row, index))
        })
        .collect()
}

fn decode_column(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return Value::Null,
    };

    // Storage class already known, so skip sqlx's declared-type compatibility check
    match storage.as_str() {
        "INTEGER" | "BOOLEAN" | "INT8" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or_else(|_| decode_fallback(row, index)),
        "REAL" | "FLOAT" | "DOUBLE" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or_else(|_| decode_fallback(row, index)),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| Value::Text(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null),
        _ => decode_fallback(row, index),
    }
}

/// Try text, then integer, then real.
fn decode_fallback(row: &SqliteRow, index: usize) -> Value {
    if let Ok(text) = row.try_get_unchecked::<String, _>(index) {
        return Value::Text(text);
    }
    if let Ok(i) = row.try_get_unchecked::<i64, _>(index) {
        return Value::Int(i);
    }
    row.try_get_unchecked::<f64, _>(index)
        .map(Value::Float)
        .unwrap_or(Value::Null)
}
