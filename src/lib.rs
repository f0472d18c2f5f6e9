//! entity-mapper
//!
//! Turns query rows into entities with typed fields and lazily or eagerly
//! resolved relations, and turns entity changes into validated, minimal SQL
//! writes.
//!
//! ```rust,ignore
//! let config = Config::load()?;
//! logging::init_tracing(&config)?;
//!
//! let orm = Orm::connect(config).await?;
//! let mut contacts = orm.repository("contact")?;
//! let contact = contacts.with("phones").find_by_id(1).await?;
//! ```

pub mod config;
pub mod db;
pub mod logging;
pub mod orm;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use config::Config;
pub use db::{Criteria, DatabaseAccess, DbError, Order, Query, QueryOutput, RawRow};
pub use orm::{
    Entity, EntityMetadata, ErrorSet, FieldDescriptor, FieldType, LoadPolicy, NoHooks,
    OrmError, RelationDescriptor, RelationKind, RelationValue, Repository, RepositoryHooks,
    Schema, Value,
};

/// Entry point tying a database, a schema and the configuration together.
#[derive(Clone)]
pub struct Orm {
    db: Arc<dyn DatabaseAccess>,
    schema: Arc<Schema>,
    config: Config,
}

impl Orm {
    pub fn new(db: Arc<dyn DatabaseAccess>, schema: Arc<Schema>, config: Config) -> Self {
        Self { db, schema, config }
    }

    /// Connect to the configured SQLite database and load the configured schema.
    #[cfg(feature = "sqlite")]
    pub async fn connect(config: Config) -> Result<Self> {
        let schema = match config.schema_path {
            Some(ref path) => Schema::load(path)?,
            None => Schema::new(),
        };
        let db = db::Database::from_config(&config)
            .await
            .with_context(|| format!("Failed to connect to {}", config.database_url))?;

        tracing::info!(
            database = %config.database_url,
            entities = schema.len(),
            "ORM ready"
        );
        Ok(Self::new(Arc::new(db), Arc::new(schema), config))
    }

    pub fn db(&self) -> &Arc<dyn DatabaseAccess> {
        &self.db
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Repository for an entity type, configured from [`Config`].
    pub fn repository(&self, entity: &str) -> Result<Repository, OrmError> {
        self.repository_with_hooks(entity, NoHooks)
    }

    pub fn repository_with_hooks<H: RepositoryHooks>(
        &self,
        entity: &str,
        hooks: H,
    ) -> Result<Repository<H>, OrmError> {
        Ok(
            Repository::with_hooks(self.db.clone(), self.schema.clone(), entity, hooks)?
                .load_policy(self.config.relation_load_policy)
                .default_limit(self.config.default_limit),
        )
    }
}
