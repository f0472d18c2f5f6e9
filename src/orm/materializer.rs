//! Entity materialization
//!
//! Converts raw rows into [`Entity`] records: declared fields are coerced
//! with [`field_value_parser`], the snapshot keeps the whole row with the
//! coerced values in place, and each relation gets a slot that is either
//! resolved now (included in the `withs` tree) or deferred to a loader.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};

use super::coerce::field_value_parser;
use super::entity::{Entity, Relation};
use super::errors::OrmError;
use super::metadata::EntityMetadata;
use super::relations::RelationResolver;
use super::withs::Withs;
use crate::db::{DatabaseAccess, Query, QueryOutput, RawRow};

/// Run a SELECT and return its rows.
pub async fn fetch_rows(db: &dyn DatabaseAccess, query: &Query) -> Result<Vec<RawRow>, OrmError> {
    match db.execute(query).await? {
        QueryOutput::Rows(rows) => Ok(rows),
        _ => Err(OrmError::UnexpectedOutput("rows")),
    }
}

#[derive(Clone)]
pub struct Materializer {
    resolver: RelationResolver,
}

impl Materializer {
    pub fn new(resolver: RelationResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &RelationResolver {
        &self.resolver
    }

    /// Build one entity from a row, resolving every relation named in `withs`.
    pub fn materialize<'a>(
        &'a self,
        metadata: &'a Arc<EntityMetadata>,
        row: RawRow,
        withs: &'a Withs,
    ) -> BoxFuture<'a, Result<Entity, OrmError>> {
        async move {
            let mut attributes = row;
            let mut values = BTreeMap::new();

            for field in &metadata.fields {
                let Some(raw) = attributes.get(&field.name).cloned() else {
                    continue;
                };
                let value = field_value_parser(field.field_type, raw);
                values.insert(field.property_name().to_string(), value.clone());
                attributes.insert(field.name.clone(), value);
            }

            let attributes = Arc::new(attributes);
            let mut relations = BTreeMap::new();

            for relation in &metadata.relations {
                let slot = match withs.get(&relation.name) {
                    Some(nested) => Relation::Loaded(
                        self.resolver
                            .resolve(&attributes, relation, nested)
                            .await?,
                    ),
                    None => Relation::Deferred(self.resolver.loader(relation, attributes.clone())),
                };
                relations.insert(relation.name.clone(), slot);
            }

            Ok(Entity::materialized(
                metadata.clone(),
                values,
                attributes,
                relations,
            ))
        }
        .boxed()
    }

    /// Materialize a batch of rows concurrently, keeping row order.
    pub async fn materialize_all(
        &self,
        metadata: &Arc<EntityMetadata>,
        rows: Vec<RawRow>,
        withs: &Withs,
    ) -> Result<Vec<Entity>, OrmError> {
        if !withs.is_empty() {
            tracing::debug!(
                entity = %metadata.name,
                rows = rows.len(),
                relations = ?withs.relations().collect::<Vec<_>>(),
                "Materializing with eager relations"
            );
        }

        try_join_all(
            rows.into_iter()
                .map(|row| self.materialize(metadata, row, withs)),
        )
        .await
    }
}
