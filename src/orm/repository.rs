//! Repository pattern for entity data access
//!
//! A [`Repository`] is the gateway for one entity type. It reads through
//! [`FindQuery`] and the `find*`/`count` helpers, and writes through the save
//! pipeline:
//!
//! ```text
//! prepare -> validate -> before_save -> insert | update -> after_save
//! ```
//!
//! Writes never return an error. Every failure is recorded in the
//! repository's [`ErrorSet`] and the call reports `false`; the set is reset
//! at the start of each `save`/`validate`/`delete` call.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let mut contacts = orm.repository("contact")?;
//!
//! let mut contact = contacts.create();
//! contact.set("first_name", "Fellipe");
//! contact.set("last_name", "Souza");
//! if !contacts.save(&mut contact).await {
//!     eprintln!("{}", contacts.errors());
//! }
//!
//! // Eager relation
//! let contact = contacts.with("phones").find_by_id(1).await?;
//!
//! // Filtered, ordered page
//! let page = contacts
//!     .query()
//!     .filter(Criteria::like("first_name", "Fel%"))
//!     .order_by(Order::desc("created_at"))
//!     .paginate(10, 20)
//!     .fetch_all()
//!     .await?;
//! ```

use std::sync::Arc;

use chrono::Utc;

use super::diff::{dirty_columns, insert_columns};
use super::entity::Entity;
use super::errors::{ErrorSet, OrmError, VALIDATION_KEY};
use super::hooks::{NoHooks, RepositoryHooks};
use super::materializer::{Materializer, fetch_rows};
use super::metadata::{EntityMetadata, FieldDescriptor, FieldType, MetadataProvider};
use super::relations::{LoadPolicy, RelationResolver};
use super::value::Value;
use super::withs::Withs;
use crate::db::{Criteria, DatabaseAccess, Order, Query, QueryOutput};

/// Page size used by `find` when no limit is given.
pub const DEFAULT_LIMIT: i64 = 100;

/// Options for [`Repository::save_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Run field validation and the validate hooks
    pub validate: bool,
}

impl SaveOptions {
    pub fn without_validation() -> Self {
        Self { validate: false }
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// Gateway for one entity type.
pub struct Repository<H: RepositoryHooks = NoHooks> {
    db: Arc<dyn DatabaseAccess>,
    schema: Arc<dyn MetadataProvider>,
    metadata: Arc<EntityMetadata>,
    primary_key: FieldDescriptor,
    hooks: H,
    errors: ErrorSet,
    withs: Vec<String>,
    load_policy: LoadPolicy,
    default_limit: i64,
}

impl Repository<NoHooks> {
    /// Repository for an entity type with the default (accepting) hooks.
    pub fn new(
        db: Arc<dyn DatabaseAccess>,
        schema: Arc<dyn MetadataProvider>,
        entity: &str,
    ) -> Result<Self, OrmError> {
        Self::with_hooks(db, schema, entity, NoHooks)
    }
}

impl<H: RepositoryHooks> Repository<H> {
    /// Repository for an entity type with custom hooks.
    pub fn with_hooks(
        db: Arc<dyn DatabaseAccess>,
        schema: Arc<dyn MetadataProvider>,
        entity: &str,
        hooks: H,
    ) -> Result<Self, OrmError> {
        let metadata = schema
            .metadata(entity)
            .ok_or_else(|| OrmError::UnknownEntity(entity.to_string()))?;
        metadata.validate()?;

        let primary_key = metadata
            .primary_key()
            .cloned()
            .ok_or_else(|| OrmError::InvalidMetadata {
                entity: entity.to_string(),
                reason: "no pk field".to_string(),
            })?;

        Ok(Self {
            db,
            schema,
            metadata,
            primary_key,
            hooks,
            errors: ErrorSet::new(),
            withs: Vec::new(),
            load_policy: LoadPolicy::default(),
            default_limit: DEFAULT_LIMIT,
        })
    }

    /// Policy for relations that are not eagerly included.
    pub fn load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Page size used when a find does not set a limit.
    pub fn default_limit(mut self, limit: i64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// A new, unsaved entity of this repository's type.
    pub fn create(&self) -> Entity {
        Entity::new(self.metadata.clone())
    }

    // ========================================================================
    // Errors
    // ========================================================================

    pub fn add_error(&mut self, field: impl Into<String>, message: impl std::fmt::Display) {
        self.errors.add(field, message);
    }

    /// Record a message under the `"Database"` key.
    pub fn add_database_error(&mut self, message: impl std::fmt::Display) {
        self.errors.add_database(message);
    }

    pub fn errors(&self) -> &ErrorSet {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    // ========================================================================
    // Inclusions
    // ========================================================================

    /// Eagerly load a relation path (`"phones"`, `"schedules.venue"`) on every
    /// subsequent find.
    pub fn with(&mut self, path: impl Into<String>) -> &mut Self {
        self.withs.push(path.into());
        self
    }

    /// The accumulated inclusion tree.
    pub fn withs(&self) -> Withs {
        Withs::from_paths(&self.withs)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Name of the first field of a type; the property name if `alias` is set.
    pub fn field_by_type(&self, field_type: FieldType, alias: bool) -> Option<&str> {
        self.metadata.field_by_type(field_type).map(|field| {
            if alias {
                field.property_name()
            } else {
                field.name.as_str()
            }
        })
    }

    /// Whether saving the entity would insert a new row.
    pub fn is_new_record(&self, entity: &Entity) -> bool {
        !entity
            .attribute(&self.primary_key.name)
            .is_some_and(Value::is_truthy)
    }

    /// Current Unix time in whole seconds.
    pub fn current_timestamp() -> i64 {
        Utc::now().timestamp()
    }

    /// Assign declared defaults to unset properties.
    pub fn prepare(&self, entity: &mut Entity) {
        for field in &self.metadata.fields {
            let Some(default) = field.default.as_ref().filter(|d| !d.is_null()) else {
                continue;
            };
            if entity.get(field.property_name()).is_none() {
                entity.set(field.property_name(), default.clone());
            }
        }
    }

    fn materializer(&self) -> Materializer {
        Materializer::new(
            RelationResolver::new(self.db.clone(), self.schema.clone())
                .with_policy(self.load_policy),
        )
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Run the validate hooks and the field checks.
    pub async fn validate(&mut self, entity: &Entity) -> bool {
        self.errors.clear();
        self.run_validation(entity).await
    }

    async fn run_validation(&mut self, entity: &Entity) -> bool {
        if !self.hooks.before_validate(entity, &mut self.errors).await {
            if !self.errors.has_errors() {
                self.errors
                    .add(VALIDATION_KEY, "Presented problems before validating");
            }
            tracing::warn!(entity = %self.metadata.name, "Rejected by before_validate hook");
            return false;
        }

        let metadata = self.metadata.clone();
        for field in &metadata.fields {
            self.check_field(field, entity.get(field.property_name()));
        }

        if !self.hooks.after_validate(entity, &mut self.errors).await {
            tracing::warn!(entity = %self.metadata.name, "Rejected by after_validate hook");
            return false;
        }

        !self.errors.has_errors()
    }

    fn check_field(&mut self, field: &FieldDescriptor, value: Option<&Value>) {
        if field.required && !field.is_primary_key() && value.is_none_or(Value::is_blank) {
            self.errors.add(&field.name, "Field is required");
        }

        let Some(value) = value.filter(|v| v.is_truthy()) else {
            return;
        };
        let numeric_text = if field.field_type.is_numeric() {
            value.as_f64()
        } else {
            None
        };
        let size = numeric_text
            .or_else(|| value.magnitude())
            .or_else(|| value.length().map(|len| len as f64));
        let Some(size) = size else {
            return;
        };

        if let Some(max) = field.max.filter(|max| size > *max) {
            self.errors
                .add(&field.name, format!("Field length must be under {}", max));
        }
        if let Some(min) = field.min.filter(|min| size < *min) {
            self.errors
                .add(&field.name, format!("Field length must be over {}", min));
        }
    }

    // ========================================================================
    // Save pipeline
    // ========================================================================

    /// Prepare, validate and write the entity.
    pub async fn save(&mut self, entity: &mut Entity) -> bool {
        self.save_with(entity, SaveOptions::default()).await
    }

    pub async fn save_with(&mut self, entity: &mut Entity, options: SaveOptions) -> bool {
        self.errors.clear();
        self.prepare(entity);

        if options.validate && !self.run_validation(entity).await {
            tracing::debug!(entity = %self.metadata.name, errors = %self.errors, "Validation failed");
            return false;
        }

        if !self.hooks.before_save(entity, &mut self.errors).await {
            if !self.errors.has_errors() {
                self.errors
                    .add(VALIDATION_KEY, "Presented problems before saving");
            }
            tracing::warn!(entity = %self.metadata.name, "Rejected by before_save hook");
            return false;
        }

        let written = if self.is_new_record(entity) {
            self.insert(entity).await
        } else {
            self.update(entity).await
        };
        if !written {
            return false;
        }

        self.hooks.after_save(entity, &mut self.errors).await
    }

    async fn insert(&mut self, entity: &mut Entity) -> bool {
        let metadata = self.metadata.clone();

        if let Some(created_at) = metadata.field_by_type(FieldType::CreatedAt) {
            entity.set(created_at.property_name(), Self::current_timestamp());
        }

        let query = insert_columns(&metadata, entity.values())
            .into_iter()
            .fold(Query::insert(&metadata.table), |query, (column, value)| {
                query.set(column, value)
            });

        match self.db.execute(&query).await {
            Ok(QueryOutput::Inserted { last_insert_id }) => {
                entity.set(self.primary_key.property_name(), last_insert_id);
                tracing::info!(entity = %metadata.name, id = last_insert_id, "Inserted");
                true
            }
            Ok(_) => {
                self.errors.add_database("Insert did not report a generated id");
                false
            }
            Err(err) => {
                tracing::warn!(entity = %metadata.name, error = %err, "Insert failed");
                self.errors.add_database(&err);
                false
            }
        }
    }

    async fn update(&mut self, entity: &mut Entity) -> bool {
        let metadata = self.metadata.clone();
        let Some(snapshot) = entity.attributes() else {
            return self.insert(entity).await;
        };

        let id = snapshot
            .get(&self.primary_key.name)
            .cloned()
            .unwrap_or_default();
        let mut columns = dirty_columns(&metadata, entity.values(), snapshot, |value| {
            self.db.normalize(value)
        });

        if columns.is_empty() {
            tracing::debug!(entity = %metadata.name, id = %id.normalized(), "Nothing to update");
            return true;
        }

        // Stamped on the entity only once the write succeeds
        let stamp = metadata.field_by_type(FieldType::UpdatedAt).map(|updated_at| {
            let now = Value::Int(Self::current_timestamp());
            columns.push((updated_at.name.clone(), now.clone()));
            (updated_at.property_name().to_string(), now)
        });

        let query = columns
            .into_iter()
            .fold(Query::update(&metadata.table), |query, (column, value)| {
                query.set(column, value)
            })
            .filter(Criteria::eq(&self.primary_key.name, id.clone()));

        match self.db.execute(&query).await {
            Ok(_) => {
                if let Some((property, now)) = stamp {
                    entity.set(property, now);
                }
                tracing::info!(entity = %metadata.name, id = %id.normalized(), "Updated");
                true
            }
            Err(err) => {
                tracing::warn!(entity = %metadata.name, error = %err, "Update failed");
                self.errors.add_database(&err);
                false
            }
        }
    }

    /// Delete the entity's row by primary key.
    ///
    /// Reports `false` when the entity has no key, when the database fails,
    /// and when no row matched (so deleting twice fails the second time).
    pub async fn delete(&mut self, entity: &Entity) -> bool {
        self.errors.clear();
        let metadata = self.metadata.clone();

        let id = entity
            .attribute(&self.primary_key.name)
            .filter(|v| v.is_truthy())
            .or_else(|| entity.get(self.primary_key.property_name()))
            .filter(|v| !v.is_null())
            .cloned();
        let Some(id) = id else {
            self.errors.add_database("Entity has no primary key value");
            return false;
        };

        let query =
            Query::delete(&metadata.table).filter(Criteria::eq(&self.primary_key.name, id.clone()));

        match self.db.execute(&query).await {
            Ok(QueryOutput::Affected(0)) => {
                self.errors.add_database(format!(
                    "No {} row with {} = {}",
                    metadata.table,
                    self.primary_key.name,
                    id.normalized()
                ));
                false
            }
            Ok(_) => {
                tracing::info!(entity = %metadata.name, id = %id.normalized(), "Deleted");
                true
            }
            Err(err) => {
                tracing::warn!(entity = %metadata.name, error = %err, "Delete failed");
                self.errors.add_database(&err);
                false
            }
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Start a find query against this repository's table.
    pub fn query(&self) -> FindQuery<'_, H> {
        FindQuery::new(self)
    }

    /// Rows matching `filter`, ordered by `orders`, with `limit` defaulting to
    /// the repository's page size and `offset` to 0.
    pub async fn find(
        &self,
        filter: Option<Criteria>,
        limit: Option<i64>,
        offset: Option<i64>,
        orders: &[Order],
    ) -> Result<Vec<Entity>, OrmError> {
        let mut query = self.query();
        query.criteria = filter;
        query.limit = limit;
        query.offset = offset;
        query.order_by = orders.to_vec();
        query.fetch_all().await
    }

    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<Entity>, OrmError> {
        self.query()
            .filter(Criteria::eq(&self.primary_key.name, id))
            .fetch_optional()
            .await
    }

    pub async fn find_one(&self, filter: Criteria) -> Result<Option<Entity>, OrmError> {
        self.query().filter(filter).fetch_optional().await
    }

    pub async fn count(&self, filter: Option<Criteria>) -> Result<i64, OrmError> {
        let query = Query::select(&self.metadata.table)
            .column("COUNT(*) AS total")
            .filter_opt(filter);

        let rows = fetch_rows(self.db.as_ref(), &query).await?;
        rows.first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_i64)
            .ok_or(OrmError::UnexpectedOutput("a total column"))
    }
}

/// Query builder for finding entities
pub struct FindQuery<'r, H: RepositoryHooks> {
    repository: &'r Repository<H>,
    criteria: Option<Criteria>,
    order_by: Vec<Order>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl<'r, H: RepositoryHooks> FindQuery<'r, H> {
    pub fn new(repository: &'r Repository<H>) -> Self {
        Self {
            repository,
            criteria: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Add a filter; repeated calls are combined with AND
    pub fn filter(mut self, criteria: Criteria) -> Self {
        self.criteria = Some(match self.criteria.take() {
            Some(existing) => existing.and(criteria),
            None => criteria,
        });
        self
    }

    /// Add ordering
    pub fn order_by(mut self, order: impl Into<Order>) -> Self {
        self.order_by.push(order.into());
        self
    }

    /// Set limit
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set offset
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set pagination (limit and offset)
    pub fn paginate(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    fn build(&self) -> Query {
        let repository = self.repository;
        let mut query = Query::select(&repository.metadata.table)
            .column("*")
            .filter_opt(self.criteria.clone());

        for order in &self.order_by {
            query = query.order_by(order.clone());
        }

        query = query.limit(self.limit.unwrap_or(repository.default_limit));
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        query
    }

    /// Execute and fetch all results
    pub async fn fetch_all(self) -> Result<Vec<Entity>, OrmError> {
        let repository = self.repository;
        let query = self.build();

        let rows = fetch_rows(repository.db.as_ref(), &query).await?;
        tracing::debug!(
            entity = %repository.metadata.name,
            rows = rows.len(),
            "Fetched rows"
        );

        repository
            .materializer()
            .materialize_all(&repository.metadata, rows, &repository.withs())
            .await
    }

    /// Execute and fetch one optional result
    pub async fn fetch_optional(self) -> Result<Option<Entity>, OrmError> {
        let results = self.limit(1).fetch_all().await?;
        Ok(results.into_iter().next())
    }
}
