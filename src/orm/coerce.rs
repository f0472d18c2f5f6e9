//! Field value coercion
//!
//! Converts raw row values into the typed values exposed on entities.
//! Coercion never fails: a value that cannot be converted is passed through.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::metadata::FieldType;
use super::value::Value;

/// Coerce a raw column value according to the field type.
///
/// - `boolean`: true only for the integer `1`
/// - `date`: parsed into a UTC timestamp (raw value kept if unparseable)
/// - `json`: parsed JSON, or the raw value when parsing fails
/// - `created_at`/`updated_at`: seconds to milliseconds, null when falsy
/// - anything else: unchanged
pub fn field_value_parser(field_type: FieldType, value: Value) -> Value {
    match field_type {
        FieldType::Boolean => Value::Bool(is_one(&value)),
        FieldType::Date => parse_date(value),
        FieldType::Json => parse_json(value),
        FieldType::CreatedAt | FieldType::UpdatedAt => seconds_to_millis(value),
        _ => value,
    }
}

fn is_one(value: &Value) -> bool {
    match value {
        Value::Int(i) => *i == 1,
        Value::Float(f) => *f == 1.0,
        _ => false,
    }
}

fn parse_date(value: Value) -> Value {
    let parsed = match &value {
        Value::Date(_) => return value,
        Value::Int(millis) => DateTime::from_timestamp_millis(*millis),
        Value::Float(millis) => DateTime::from_timestamp_millis(*millis as i64),
        Value::Text(text) => parse_date_text(text),
        _ => None,
    };

    parsed.map_or(value, Value::Date)
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_json(value: Value) -> Value {
    match &value {
        Value::Text(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => Value::Json(json),
            Err(_) => value,
        },
        _ => value,
    }
}

fn seconds_to_millis(value: Value) -> Value {
    if !value.is_truthy() {
        return Value::Null;
    }

    match value {
        Value::Int(seconds) => Value::Int(seconds.saturating_mul(1000)),
        Value::Float(seconds) => Value::Float(seconds * 1000.0),
        Value::Bool(_) => Value::Int(1000),
        other => match other.as_f64() {
            Some(seconds) if seconds.fract() == 0.0 => {
                Value::Int((seconds as i64).saturating_mul(1000))
            }
            Some(seconds) => Value::Float(seconds * 1000.0),
            None => Value::Null,
        },
    }
}
