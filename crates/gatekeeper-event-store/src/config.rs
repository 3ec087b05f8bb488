//! Database configuration read from the environment.

use std::time::Duration;

use gatekeeper_core::error::EventstoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::info;

const DATABASE_URL: &str = "DATABASE_URL";
const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";
const DATABASE_ACQUIRE_TIMEOUT_SECS: &str = "DATABASE_ACQUIRE_TIMEOUT_SECS";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// A variable is set to something unparsable.
    #[error("{name} must be a positive integer, got {value:?}")]
    Invalid {
        /// The offending variable.
        name: &'static str,
        /// Its raw value.
        value: String,
    },
}

/// Connection settings for [`PgEventRepository`](crate::pg_event_repository::PgEventRepository).
#[derive(Clone, PartialEq, Eq)]
pub struct PgConfig {
    /// Connection string.
    pub database_url: String,
    /// Upper bound of pooled connections.
    pub max_connections: u32,
    /// How long an operation waits for a free connection.
    pub acquire_timeout: Duration,
}

impl std::fmt::Debug for PgConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConfig")
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl PgConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DATABASE_URL` is unset or a numeric variable
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`PgConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(DATABASE_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL))?;
        let max_connections = positive(&lookup, DATABASE_MAX_CONNECTIONS, 10)?;
        let acquire_timeout = positive(&lookup, DATABASE_ACQUIRE_TIMEOUT_SECS, 5)?;

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(u64::from(acquire_timeout)),
        })
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::Infrastructure` if the database is unreachable.
    pub async fn connect(&self) -> Result<PgPool, EventstoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await
            .map_err(|e| EventstoreError::Infrastructure(Box::new(e)))?;
        info!(max_connections = self.max_connections, "database pool ready");
        Ok(pool)
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::Invalid { name, value: raw }),
        },
    }
}
