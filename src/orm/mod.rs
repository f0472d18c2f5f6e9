//! Metadata-driven ORM
//!
//! - [`metadata`]: entity types, fields, relations and the schema registry
//! - [`materializer`]: rows to [`Entity`] records
//! - [`relations`]: relation queries and deferred loaders
//! - [`repository`]: the save pipeline and read operations

pub mod coerce;
pub mod diff;
pub mod entity;
pub mod errors;
pub mod hooks;
pub mod materializer;
pub mod metadata;
pub mod relations;
pub mod repository;
pub mod value;
pub mod withs;

pub use coerce::field_value_parser;
pub use entity::{Attributes, Entity, Relation, RelationValue};
pub use errors::{DATABASE_KEY, ErrorSet, OrmError, VALIDATION_KEY};
pub use hooks::{NoHooks, RepositoryHooks};
pub use materializer::Materializer;
pub use metadata::{
    EntityMetadata, FieldDescriptor, FieldType, MetadataProvider, RelationDescriptor,
    RelationKind, Schema,
};
pub use relations::{LoadPolicy, RelationLoader, RelationResolver};
pub use repository::{DEFAULT_LIMIT, FindQuery, Repository, SaveOptions};
pub use value::{DATE_FORMAT, Value};
pub use withs::Withs;
