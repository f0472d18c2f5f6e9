//! Relation resolution
//!
//! [`RelationResolver`] turns an owner's snapshot plus a relation descriptor
//! into a query, runs it and materializes the related rows. The query shapes:
//!
//! - HASONE / BELONGSTO: `target.referenced_field = owner[field]`, limit 1
//! - HASMANY: same predicate, no limit
//! - MANYMANY: join table inner-joined to the target on
//!   `join.referenced_field = target.id`, filtered by `join.field = owner["id"]`
//!
//! Relations of unknown kind resolve to nothing without querying.
//!
//! [`RelationLoader`] is the deferred form stored on entities: the resolver,
//! the descriptor, the owner snapshot and a [`LoadPolicy`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::entity::{Attributes, RelationValue};
use super::errors::OrmError;
use super::materializer::{Materializer, fetch_rows};
use super::metadata::{EntityMetadata, MetadataProvider, RelationDescriptor, RelationKind};
use super::value::Value;
use super::withs::Withs;
use crate::db::{Criteria, DatabaseAccess, JoinKind, Query};

/// Owner column MANYMANY joins always filter on.
pub const MANY_MANY_OWNER_KEY: &str = "id";

/// Whether deferred relations remember their first result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Query again on every load
    #[default]
    Reload,
    /// Query once, then return the cached result
    Memoize,
}

impl FromStr for LoadPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reload" | "lazy" => Ok(LoadPolicy::Reload),
            "memoize" | "cache" | "cached" => Ok(LoadPolicy::Memoize),
            _ => Err(anyhow::anyhow!("Unknown relation load policy: {}", s)),
        }
    }
}

// ============================================================================
// Query shapes
// ============================================================================

fn owner_value(owner: &Attributes, column: &str) -> Value {
    owner.get(column).cloned().unwrap_or_default()
}

/// HASONE / BELONGSTO lookup.
pub fn has_one_query(
    target: &EntityMetadata,
    relation: &RelationDescriptor,
    owner: &Attributes,
) -> Query {
    has_many_query(target, relation, owner).limit(1)
}

/// HASMANY lookup.
pub fn has_many_query(
    target: &EntityMetadata,
    relation: &RelationDescriptor,
    owner: &Attributes,
) -> Query {
    Query::select(&target.table).filter(Criteria::eq(
        &relation.referenced_field,
        owner_value(owner, &relation.field),
    ))
}

/// MANYMANY lookup through the join table.
pub fn many_many_query(
    target: &EntityMetadata,
    relation: &RelationDescriptor,
    owner: &Attributes,
) -> Result<Query, OrmError> {
    let join_table = relation
        .table
        .as_deref()
        .ok_or_else(|| OrmError::InvalidMetadata {
            entity: target.name.clone(),
            reason: format!("MANYMANY relation '{}' has no join table", relation.name),
        })?;

    Ok(Query::select(join_table)
        .column(format!("{}.*", target.table))
        .join(
            JoinKind::Inner,
            &target.table,
            format!(
                "{}.{} = {}.id",
                join_table, relation.referenced_field, target.table
            ),
        )
        .filter(Criteria::eq(
            format!("{}.{}", join_table, relation.field),
            owner_value(owner, MANY_MANY_OWNER_KEY),
        )))
}

// ============================================================================
// Resolver
// ============================================================================

/// Fetches and materializes the rows behind a relation.
#[derive(Clone)]
pub struct RelationResolver {
    db: Arc<dyn DatabaseAccess>,
    schema: Arc<dyn MetadataProvider>,
    policy: LoadPolicy,
}

impl RelationResolver {
    pub fn new(db: Arc<dyn DatabaseAccess>, schema: Arc<dyn MetadataProvider>) -> Self {
        Self {
            db,
            schema,
            policy: LoadPolicy::default(),
        }
    }

    /// Policy handed to the loaders this resolver creates.
    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn db(&self) -> &Arc<dyn DatabaseAccess> {
        &self.db
    }

    pub fn schema(&self) -> &Arc<dyn MetadataProvider> {
        &self.schema
    }

    /// A deferred loader for one relation of one owner.
    pub fn loader(&self, relation: &RelationDescriptor, owner: Arc<Attributes>) -> RelationLoader {
        RelationLoader {
            resolver: self.clone(),
            relation: relation.clone(),
            owner,
            policy: self.policy,
            cache: Arc::new(OnceCell::new()),
        }
    }

    /// Resolve a relation for an owner snapshot, eagerly loading `withs`
    /// on the related entities.
    ///
    /// Database failures propagate; an empty result is `None` or `[]`.
    pub fn resolve<'a>(
        &'a self,
        owner: &'a Attributes,
        relation: &'a RelationDescriptor,
        withs: &'a Withs,
    ) -> BoxFuture<'a, Result<RelationValue, OrmError>> {
        async move {
            if relation.kind == RelationKind::Unknown {
                return Ok(RelationValue::One(None));
            }

            let target = self
                .schema
                .metadata(&relation.referenced_entity)
                .ok_or_else(|| OrmError::UnknownEntity(relation.referenced_entity.clone()))?;

            let query = match relation.kind {
                RelationKind::HasOne | RelationKind::BelongsTo => {
                    has_one_query(&target, relation, owner)
                }
                RelationKind::HasMany => has_many_query(&target, relation, owner),
                RelationKind::ManyMany => many_many_query(&target, relation, owner)?,
                RelationKind::Unknown => return Ok(RelationValue::One(None)),
            };

            let rows = fetch_rows(self.db.as_ref(), &query).await?;
            tracing::debug!(
                relation = %relation.name,
                target = %target.name,
                rows = rows.len(),
                "Resolved relation"
            );

            let entities = Materializer::new(self.clone())
                .materialize_all(&target, rows, withs)
                .await?;

            Ok(if relation.kind.is_multiple() {
                RelationValue::Many(entities)
            } else {
                RelationValue::One(entities.into_iter().next().map(Box::new))
            })
        }
        .boxed()
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Deferred relation stored on an entity.
#[derive(Clone)]
pub struct RelationLoader {
    resolver: RelationResolver,
    relation: RelationDescriptor,
    owner: Arc<Attributes>,
    policy: LoadPolicy,
    cache: Arc<OnceCell<RelationValue>>,
}

impl RelationLoader {
    pub fn relation(&self) -> &RelationDescriptor {
        &self.relation
    }

    pub fn owner(&self) -> &Attributes {
        &self.owner
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    /// Whether a memoized result is available.
    pub fn is_cached(&self) -> bool {
        self.cache.initialized()
    }

    /// Resolve the relation with no nested inclusions.
    pub async fn load(&self) -> Result<RelationValue, OrmError> {
        let withs = Withs::new();
        match self.policy {
            LoadPolicy::Reload => {
                self.resolver
                    .resolve(&self.owner, &self.relation, &withs)
                    .await
            }
            LoadPolicy::Memoize => self
                .cache
                .get_or_try_init(|| self.resolver.resolve(&self.owner, &self.relation, &withs))
                .await
                .cloned(),
        }
    }
}

impl fmt::Debug for RelationLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationLoader")
            .field("relation", &self.relation.name)
            .field("kind", &self.relation.kind)
            .field("policy", &self.policy)
            .field("cached", &self.is_cached())
            .finish()
    }
}
