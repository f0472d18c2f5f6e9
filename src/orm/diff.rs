//! Write sets
//!
//! Pure functions computing which columns an INSERT or UPDATE writes. They
//! take the current property values and the loaded snapshot and never touch
//! the database.

use std::collections::BTreeMap;

use super::entity::Attributes;
use super::metadata::{EntityMetadata, FieldType};
use super::value::Value;

/// Columns written by an INSERT: every declared field except the primary key
/// and the updated-at stamp, skipping unset and null values.
pub fn insert_columns(
    metadata: &EntityMetadata,
    values: &BTreeMap<String, Value>,
) -> Vec<(String, Value)> {
    metadata
        .fields
        .iter()
        .filter(|field| !matches!(field.field_type, FieldType::Pk | FieldType::UpdatedAt))
        .filter_map(|field| {
            values
                .get(field.property_name())
                .filter(|value| !value.is_null())
                .map(|value| (field.name.clone(), value.clone()))
        })
        .collect()
}

/// Columns whose current value differs from the snapshot.
///
/// Values are compared through `normalize`, so type-equivalent values (a
/// numeric string and the number) do not count as changes. Unset values and
/// columns missing from the snapshot compare as null. The primary key and
/// both timestamp stamps are never part of the diff.
pub fn dirty_columns<F>(
    metadata: &EntityMetadata,
    values: &BTreeMap<String, Value>,
    snapshot: &Attributes,
    normalize: F,
) -> Vec<(String, Value)>
where
    F: Fn(&Value) -> String,
{
    let null = Value::Null;

    metadata
        .fields
        .iter()
        .filter(|field| {
            !matches!(
                field.field_type,
                FieldType::Pk | FieldType::CreatedAt | FieldType::UpdatedAt
            )
        })
        .filter_map(|field| {
            let current = values.get(field.property_name()).unwrap_or(&null);
            let previous = snapshot.get(&field.name).unwrap_or(&null);
            (normalize(current) != normalize(previous))
                .then(|| (field.name.clone(), current.clone()))
        })
        .collect()
}
