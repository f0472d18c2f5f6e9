//! Entity metadata
//!
//! Static description of each entity type: its table, its fields and its
//! relations. Metadata is declared by the application (in code or in a
//! YAML/JSON schema file) and only read by the ORM.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::errors::OrmError;
use super::value::Value;

/// Storage/coercion type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Primary key. Exactly one per entity type.
    Pk,
    Varchar,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Json,
    /// Unix seconds on write, milliseconds once loaded.
    CreatedAt,
    UpdatedAt,
    /// Anything else; values pass through untouched.
    #[serde(other)]
    Other,
}

impl FieldType {
    /// Whether min/max compare the value as a number, even when it is given
    /// as text.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }
}

/// Column definition for one entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Column name in the database
    pub name: String,
    /// Property name exposed on the entity, if different from the column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Value assigned by `prepare` when the property is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            alias: None,
            field_type,
            required: false,
            min: None,
            max: None,
            default: None,
        }
    }

    /// Shorthand for a required primary key column.
    pub fn pk(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Pk).required()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// The key under which the entity exposes this field.
    pub fn property_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_primary_key(&self) -> bool {
        self.field_type == FieldType::Pk
    }
}

/// Cardinality/direction of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "HASONE")]
    HasOne,
    #[serde(rename = "HASMANY")]
    HasMany,
    #[serde(rename = "BELONGSTO")]
    BelongsTo,
    #[serde(rename = "MANYMANY")]
    ManyMany,
    /// A relation type the ORM does not understand. Resolves to nothing.
    #[serde(other)]
    Unknown,
}

impl RelationKind {
    /// Whether the relation resolves to a list rather than a single entity.
    pub fn is_multiple(&self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ManyMany)
    }
}

/// Relation from one entity type to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Column on the owning side (join-table column for MANYMANY)
    pub field: String,
    /// Column on the referenced side (join-table column for MANYMANY)
    pub referenced_field: String,
    /// Name of the referenced entity type in the schema
    pub referenced_entity: String,
    /// Join table, MANYMANY only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl RelationDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: RelationKind,
        field: impl Into<String>,
        referenced_field: impl Into<String>,
        referenced_entity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            field: field.into(),
            referenced_field: referenced_field.into(),
            referenced_entity: referenced_entity.into(),
            table: None,
        }
    }

    pub fn has_one(
        name: impl Into<String>,
        field: impl Into<String>,
        referenced_field: impl Into<String>,
        referenced_entity: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::HasOne, field, referenced_field, referenced_entity)
    }

    pub fn has_many(
        name: impl Into<String>,
        field: impl Into<String>,
        referenced_field: impl Into<String>,
        referenced_entity: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::HasMany, field, referenced_field, referenced_entity)
    }

    pub fn belongs_to(
        name: impl Into<String>,
        field: impl Into<String>,
        referenced_field: impl Into<String>,
        referenced_entity: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::BelongsTo, field, referenced_field, referenced_entity)
    }

    /// `field` and `referenced_field` are both columns of `join_table`.
    pub fn many_many(
        name: impl Into<String>,
        join_table: impl Into<String>,
        field: impl Into<String>,
        referenced_field: impl Into<String>,
        referenced_entity: impl Into<String>,
    ) -> Self {
        let mut relation =
            Self::new(name, RelationKind::ManyMany, field, referenced_field, referenced_entity);
        relation.table = Some(join_table.into());
        relation
    }
}

/// Metadata about a database entity (table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Entity type name used for lookups (e.g. "contact")
    pub name: String,
    /// The SQL table name (e.g. "contacts")
    pub table: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub relations: Vec<RelationDescriptor>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.field_by_type(FieldType::Pk)
    }

    /// First field declared with the given type.
    pub fn field_by_type(&self, field_type: FieldType) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.field_type == field_type)
    }

    /// Look a field up by column name.
    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Check the structural rules every entity type must satisfy.
    pub fn validate(&self) -> Result<(), OrmError> {
        let invalid = |reason: String| OrmError::InvalidMetadata {
            entity: self.name.clone(),
            reason,
        };

        let pk_count = self.fields.iter().filter(|f| f.is_primary_key()).count();
        if pk_count != 1 {
            return Err(invalid(format!(
                "expected exactly one pk field, found {}",
                pk_count
            )));
        }

        for relation in &self.relations {
            if relation.kind == RelationKind::ManyMany && relation.table.is_none() {
                return Err(invalid(format!(
                    "MANYMANY relation '{}' has no join table",
                    relation.name
                )));
            }
        }

        Ok(())
    }
}

/// Source of entity metadata, keyed by entity type name.
pub trait MetadataProvider: Send + Sync {
    fn metadata(&self, entity: &str) -> Option<Arc<EntityMetadata>>;
}

/// On-disk schema document: a list of entity definitions.
#[derive(Debug, Deserialize)]
struct SchemaDocument {
    entities: Vec<EntityMetadata>,
}

/// In-memory registry of entity metadata.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: HashMap<String, Arc<EntityMetadata>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema, validating every entity and every relation target.
    pub fn from_entities(
        entities: impl IntoIterator<Item = EntityMetadata>,
    ) -> Result<Self, OrmError> {
        let mut schema = Self::new();
        for entity in entities {
            schema.register(entity)?;
        }
        schema.check_references()?;
        Ok(schema)
    }

    pub fn register(&mut self, entity: EntityMetadata) -> Result<(), OrmError> {
        entity.validate()?;
        self.entities.insert(entity.name.clone(), Arc::new(entity));
        Ok(())
    }

    /// Every relation must point at a registered entity type.
    pub fn check_references(&self) -> Result<(), OrmError> {
        for entity in self.entities.values() {
            for relation in &entity.relations {
                if relation.kind != RelationKind::Unknown
                    && !self.entities.contains_key(&relation.referenced_entity)
                {
                    return Err(OrmError::InvalidMetadata {
                        entity: entity.name.clone(),
                        reason: format!(
                            "relation '{}' references unknown entity '{}'",
                            relation.name, relation.referenced_entity
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let document: SchemaDocument =
            serde_yaml::from_str(source).context("Invalid YAML schema")?;
        Ok(Self::from_entities(document.entities)?)
    }

    pub fn from_json(source: &str) -> Result<Self> {
        let document: SchemaDocument =
            serde_json::from_str(source).context("Invalid JSON schema")?;
        Ok(Self::from_entities(document.entities)?)
    }

    /// Load a schema file; `.json` is parsed as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;

        let schema = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&source),
            _ => Self::from_yaml(&source),
        }
        .with_context(|| format!("Failed to load schema from {}", path.display()))?;

        tracing::debug!(path = %path.display(), entities = schema.len(), "Schema loaded");
        Ok(schema)
    }

    pub fn get(&self, entity: &str) -> Option<Arc<EntityMetadata>> {
        self.entities.get(entity).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MetadataProvider for Schema {
    fn metadata(&self, entity: &str) -> Option<Arc<EntityMetadata>> {
        self.get(entity)
    }
}
