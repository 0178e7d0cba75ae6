//! Configuration loading and representation.
//!
//! Every setting has a code-level builder; `from_env` reads the same settings
//! from environment variables with defaults, the way deployed services wire
//! the engine.

use thiserror::Error;

pub const ENV_ENTITY_NAME: &str = "EVENTIDE_ENTITY_NAME";
pub const ENV_SNAPSHOTS: &str = "EVENTIDE_SNAPSHOTS";
pub const ENV_QUERY_LIMIT: &str = "EVENTIDE_QUERY_LIMIT";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_PG_MAX_CONNECTIONS: &str = "EVENTIDE_PG_MAX_CONNECTIONS";

const DEFAULT_PG_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Settings of one engine instance (one aggregate type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Aggregate type tag stamped on every event and snapshot.
    pub entity_name: String,
    /// Maintain snapshot documents on commit and allow `query_snapshots`.
    pub snapshots: bool,
    /// Limit applied to scans when the caller passes none.
    pub default_query_limit: Option<usize>,
}

impl EngineConfig {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            snapshots: false,
            default_query_limit: None,
        }
    }

    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.snapshots = enabled;
        self
    }

    pub fn with_default_query_limit(mut self, limit: Option<usize>) -> Self {
        self.default_query_limit = limit;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings through `lookup` (environment, file, test map, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let entity_name = lookup(ENV_ENTITY_NAME)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_ENTITY_NAME))?;

        let snapshots = match lookup(ENV_SNAPSHOTS) {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                var: ENV_SNAPSHOTS,
                value: raw,
            })?,
            None => false,
        };

        let default_query_limit = match lookup(ENV_QUERY_LIMIT) {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| ConfigError::Invalid {
                var: ENV_QUERY_LIMIT,
                value: raw.clone(),
            })?),
            None => None,
        };

        Ok(Self {
            entity_name,
            snapshots,
            default_query_limit,
        })
    }
}

/// Connection settings for the Postgres event store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_PG_MAX_CONNECTIONS,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(ENV_DATABASE_URL).ok_or(ConfigError::Missing(ENV_DATABASE_URL))?;
        let max_connections = match lookup(ENV_PG_MAX_CONNECTIONS) {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| ConfigError::Invalid {
                var: ENV_PG_MAX_CONNECTIONS,
                value: raw.clone(),
            })?,
            None => DEFAULT_PG_MAX_CONNECTIONS,
        };
        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn engine_config_defaults() {
        let cfg = EngineConfig::from_lookup(lookup(&[(ENV_ENTITY_NAME, "timestamp")])).unwrap();
        assert_eq!(cfg, EngineConfig::new("timestamp"));
        assert!(!cfg.snapshots);
    }

    #[test]
    fn engine_config_reads_all_settings() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            (ENV_ENTITY_NAME, "timestamp"),
            (ENV_SNAPSHOTS, "TRUE"),
            (ENV_QUERY_LIMIT, "250"),
        ]))
        .unwrap();
        assert_eq!(
            cfg,
            EngineConfig::new("timestamp")
                .with_snapshots(true)
                .with_default_query_limit(Some(250))
        );
    }

    #[test]
    fn engine_config_rejects_bad_values() {
        assert_eq!(
            EngineConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::Missing(ENV_ENTITY_NAME)
        );
        let err = EngineConfig::from_lookup(lookup(&[
            (ENV_ENTITY_NAME, "timestamp"),
            (ENV_SNAPSHOTS, "sometimes"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_SNAPSHOTS, .. }));
    }

    #[test]
    fn postgres_config_defaults_pool_size() {
        let cfg = PostgresConfig::from_lookup(lookup(&[(ENV_DATABASE_URL, "postgres://localhost/es")])).unwrap();
        assert_eq!(cfg.max_connections, DEFAULT_PG_MAX_CONNECTIONS);

        let err = PostgresConfig::from_lookup(lookup(&[
            (ENV_DATABASE_URL, "postgres://localhost/es"),
            (ENV_PG_MAX_CONNECTIONS, "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_PG_MAX_CONNECTIONS, .. }));
    }
}
