//! Entity records
//!
//! An [`Entity`] is a runtime record shaped by [`EntityMetadata`]: one value
//! per declared field (keyed by alias if present, else by column name), one
//! relation slot per declared relation, and the snapshot of what was loaded
//! from the database.
//!
//! The snapshot is captured once when the entity is materialized and is never
//! touched by setters. It drives dirty-diffing and relation lookups, and its
//! primary key decides whether a save inserts or updates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::errors::OrmError;
use super::metadata::{EntityMetadata, RelationKind};
use super::relations::RelationLoader;
use super::value::Value;

/// Raw column name -> value, as last loaded from the database.
pub type Attributes = BTreeMap<String, Value>;

/// Resolved content of a relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// HASONE / BELONGSTO (and relations of unknown kind, which are always empty)
    One(Option<Box<Entity>>),
    /// HASMANY / MANYMANY
    Many(Vec<Entity>),
}

impl RelationValue {
    /// Empty value for a relation kind.
    pub fn empty(kind: RelationKind) -> Self {
        if kind.is_multiple() {
            RelationValue::Many(Vec::new())
        } else {
            RelationValue::One(None)
        }
    }

    pub fn as_one(&self) -> Option<&Entity> {
        match self {
            RelationValue::One(entity) => entity.as_deref(),
            RelationValue::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&[Entity]> {
        match self {
            RelationValue::Many(entities) => Some(entities),
            RelationValue::One(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RelationValue::One(entity) => usize::from(entity.is_some()),
            RelationValue::Many(entities) => entities.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for RelationValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RelationValue::One(None) => serializer.serialize_none(),
            RelationValue::One(Some(entity)) => entity.serialize(serializer),
            RelationValue::Many(entities) => {
                let mut seq = serializer.serialize_seq(Some(entities.len()))?;
                for entity in entities {
                    seq.serialize_element(entity)?;
                }
                seq.end()
            }
        }
    }
}

/// A relation slot on an entity.
#[derive(Clone)]
pub enum Relation {
    /// Resolved during materialization through the inclusion tree
    Loaded(RelationValue),
    /// Resolved on demand by its loader
    Deferred(RelationLoader),
}

impl Relation {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Relation::Loaded(_))
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Loaded(value) => f.debug_tuple("Loaded").field(value).finish(),
            Relation::Deferred(loader) => f.debug_tuple("Deferred").field(loader).finish(),
        }
    }
}

/// Deferred slots compare equal when they would resolve the same relation.
impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Relation::Loaded(a), Relation::Loaded(b)) => a == b,
            (Relation::Deferred(a), Relation::Deferred(b)) => {
                a.relation() == b.relation() && a.owner() == b.owner()
            }
            _ => false,
        }
    }
}

/// One row of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    metadata: Arc<EntityMetadata>,
    values: BTreeMap<String, Value>,
    attributes: Option<Arc<Attributes>>,
    relations: BTreeMap<String, Relation>,
}

impl Entity {
    /// A new, unsaved entity with no values.
    pub fn new(metadata: Arc<EntityMetadata>) -> Self {
        Self {
            metadata,
            values: BTreeMap::new(),
            attributes: None,
            relations: BTreeMap::new(),
        }
    }

    /// A new, unsaved entity populated from property/value pairs.
    pub fn from_values<K, V>(
        metadata: Arc<EntityMetadata>,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut entity = Self::new(metadata);
        entity.fill(values);
        entity
    }

    pub(crate) fn materialized(
        metadata: Arc<EntityMetadata>,
        values: BTreeMap<String, Value>,
        attributes: Arc<Attributes>,
        relations: BTreeMap<String, Relation>,
    ) -> Self {
        Self {
            metadata,
            values,
            attributes: Some(attributes),
            relations,
        }
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    /// Entity type name.
    pub fn entity_type(&self) -> &str {
        &self.metadata.name
    }

    /// Current value of a property (alias or column name).
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Assign a property. Only declared fields are ever written to the database.
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(property.into(), value.into());
    }

    /// Remove a property so that it counts as unset.
    pub fn unset(&mut self, property: &str) -> Option<Value> {
        self.values.remove(property)
    }

    /// Assign several properties at once.
    pub fn fill<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (property, value) in values {
            self.set(property, value);
        }
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Snapshot taken at materialization, keyed by column name.
    /// `None` for entities that were never loaded.
    pub fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_deref()
    }

    pub fn attribute(&self, column: &str) -> Option<&Value> {
        self.attributes.as_ref().and_then(|attributes| attributes.get(column))
    }

    /// Whether a save would insert: no snapshot, or a snapshot without a
    /// truthy primary key.
    pub fn is_new(&self) -> bool {
        let Some(pk) = self.metadata.primary_key() else {
            return true;
        };
        !self
            .attribute(&pk.name)
            .is_some_and(Value::is_truthy)
    }

    /// Current primary key value, under the key's property name.
    pub fn id(&self) -> Option<&Value> {
        self.metadata
            .primary_key()
            .and_then(|pk| self.get(pk.property_name()))
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.relations
    }

    /// Eagerly loaded relation content, if the relation was included.
    pub fn loaded(&self, name: &str) -> Option<&RelationValue> {
        match self.relations.get(name) {
            Some(Relation::Loaded(value)) => Some(value),
            _ => None,
        }
    }

    /// Resolve a relation.
    ///
    /// Included relations return their stored value without touching the
    /// database. Deferred relations go through their loader, which queries
    /// again on every call unless its policy memoizes. Entities that were
    /// never loaded have no related rows.
    pub async fn load(&self, name: &str) -> Result<RelationValue, OrmError> {
        match self.relations.get(name) {
            Some(Relation::Loaded(value)) => Ok(value.clone()),
            Some(Relation::Deferred(loader)) => loader.load().await,
            None => match self.metadata.find_relation(name) {
                Some(relation) if self.attributes.is_none() => {
                    Ok(RelationValue::empty(relation.kind))
                }
                _ => Err(OrmError::UnknownRelation {
                    entity: self.metadata.name.clone(),
                    relation: name.to_string(),
                }),
            },
        }
    }

    /// JSON view of the field values and included relations.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let loaded: Vec<(&String, &RelationValue)> = self
            .relations
            .iter()
            .filter_map(|(name, relation)| match relation {
                Relation::Loaded(value) => Some((name, value)),
                Relation::Deferred(_) => None,
            })
            .collect();

        let mut map = serializer.serialize_map(Some(self.values.len() + loaded.len()))?;
        for (property, value) in &self.values {
            map.serialize_entry(property, value)?;
        }
        for (name, value) in loaded {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
