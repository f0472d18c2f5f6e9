//! Dynamic column values
//!
//! Rows come back from the database as loosely typed values and entity fields
//! hold the coerced form. `Value` covers both: storage classes (`Int`, `Float`,
//! `Text`, `Null`) and the richer types produced by field coercion (`Bool`,
//! `Date`, `Json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Format used when dates are written back to the database.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single column or field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or an empty string. Used by the required-field check.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Truthiness as the save pipeline understands it: null, `false`, zero,
    /// NaN and the empty string are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::Json(json) => match json {
                serde_json::Value::Null => false,
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                serde_json::Value::String(s) => !s.is_empty(),
                _ => true,
            },
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Json(json) => json.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Json(json) => json.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            Value::Json(serde_json::Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }

    /// Numeric view used for min/max checks on numbers.
    pub(crate) fn magnitude(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Json(serde_json::Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    /// Length view used for min/max checks on strings and arrays.
    pub(crate) fn length(&self) -> Option<usize> {
        match self {
            Value::Text(s) => Some(s.chars().count()),
            Value::Json(serde_json::Value::String(s)) => Some(s.chars().count()),
            Value::Json(serde_json::Value::Array(items)) => Some(items.len()),
            _ => None,
        }
    }

    /// Canonical textual form used to compare two values under the
    /// database's coercion rules. Numeric strings normalize like numbers,
    /// booleans like `1`/`0`, and other text is quoted so it cannot collide
    /// with `NULL` or a number.
    pub fn normalized(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => normalize_number(*f),
            Value::Text(s) => normalize_text(s),
            Value::Date(date) => format!("'{}'", date.format(DATE_FORMAT)),
            Value::Json(json) => match json {
                serde_json::Value::Null => "NULL".to_string(),
                serde_json::Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => i.to_string(),
                    None => normalize_number(n.as_f64().unwrap_or_default()),
                },
                serde_json::Value::String(s) => normalize_text(s),
                other => format!("'{}'", other),
            },
        }
    }

    /// Representation handed to the driver when the value is bound.
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(String::from(if *b { "1" } else { "0" })),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Date(date) => Some(date.format(DATE_FORMAT).to_string()),
            Value::Json(json) => Some(json.to_string()),
        }
    }
}

fn normalize_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

fn normalize_text(s: &str) -> String {
    match s.trim().parse::<f64>() {
        Ok(f) if !s.trim().is_empty() && f.is_finite() => normalize_number(f),
        _ => format!("'{}'", s),
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Plain JSON scalars map onto storage values; objects and arrays stay JSON.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Date(date) => serializer.serialize_str(&date.to_rfc3339()),
            Value::Json(json) => json.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}
