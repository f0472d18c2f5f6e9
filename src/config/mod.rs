//! Configuration management

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::orm::{DEFAULT_LIMIT, LoadPolicy};

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL or path
    /// Prefers DATABASE_PATH, falls back to DATABASE_URL
    pub database_url: String,

    /// Connection pool size
    pub max_connections: u32,

    /// Page size for finds without an explicit limit
    pub default_limit: i64,

    /// Whether deferred relations cache their first result
    pub relation_load_policy: LoadPolicy,

    /// YAML or JSON file declaring the entity types
    pub schema_path: Option<PathBuf>,

    /// Fallback tracing filter when RUST_LOG is unset
    pub log_filter: String,

    /// Emit JSON-formatted logs
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 10,
            default_limit: DEFAULT_LIMIT,
            relation_load_policy: LoadPolicy::default(),
            schema_path: None,
            log_filter: "entity_mapper=info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load `.env` (if present), then read the environment
    pub fn load() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or(defaults.database_url);

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            None => defaults.max_connections,
        };

        let default_limit = match lookup("ORM_DEFAULT_LIMIT") {
            Some(value) => value.parse().context("Invalid ORM_DEFAULT_LIMIT")?,
            None => defaults.default_limit,
        };

        let relation_load_policy = match lookup("ORM_RELATION_LOAD_POLICY") {
            Some(value) => value
                .parse()
                .context("Invalid ORM_RELATION_LOAD_POLICY")?,
            None => defaults.relation_load_policy,
        };

        Ok(Self {
            database_url,
            max_connections,
            default_limit,
            relation_load_policy,

            schema_path: lookup("ORM_SCHEMA_PATH").map(PathBuf::from),

            log_filter: lookup("LOG_FILTER").unwrap_or(defaults.log_filter),

            log_json: lookup("LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.log_json),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.default_limit, 100);
        assert_eq!(config.relation_load_policy, LoadPolicy::Reload);
        assert!(config.schema_path.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn test_database_path_preferred() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://url.db"),
            ("DATABASE_PATH", "sqlite://path.db"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite://path.db");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_MAX_CONNECTIONS", "1"),
            ("ORM_DEFAULT_LIMIT", "25"),
            ("ORM_RELATION_LOAD_POLICY", "memoize"),
            ("ORM_SCHEMA_PATH", "schema.yaml"),
            ("LOG_JSON", "1"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.default_limit, 25);
        assert_eq!(config.relation_load_policy, LoadPolicy::Memoize);
        assert_eq!(config.schema_path, Some(PathBuf::from("schema.yaml")));
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("ORM_DEFAULT_LIMIT", "many")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ORM_RELATION_LOAD_POLICY", "never")])).is_err());
    }
}
