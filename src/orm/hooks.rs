//! Repository lifecycle hooks
//!
//! Hooks run around validation and saving. Each returns whether the pipeline
//! may continue; a hook may also record messages in the error set it is
//! given. All hooks accept by default.

use async_trait::async_trait;

use super::entity::Entity;
use super::errors::ErrorSet;

#[async_trait]
pub trait RepositoryHooks: Send + Sync {
    /// Runs before field validation. Returning `false` aborts validation.
    async fn before_validate(&self, _entity: &Entity, _errors: &mut ErrorSet) -> bool {
        true
    }

    /// Runs after field validation. Returning `false` fails validation.
    async fn after_validate(&self, _entity: &Entity, _errors: &mut ErrorSet) -> bool {
        true
    }

    /// Runs after validation, before the write. Returning `false` aborts the save.
    async fn before_save(&self, _entity: &Entity, _errors: &mut ErrorSet) -> bool {
        true
    }

    /// Runs after a successful write. Its result is the result of the save.
    async fn after_save(&self, _entity: &Entity, _errors: &mut ErrorSet) -> bool {
        true
    }
}

/// Hooks that accept everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl RepositoryHooks for NoHooks {}
