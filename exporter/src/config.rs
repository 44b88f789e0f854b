//! Exporter configuration and connection pool construction

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::log::LevelFilter;

use crate::error::Error;

const DEFAULT_SCHEMA: &str = "otel";

const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_MIN_CONNECTIONS: u32 = 2;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;
const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Backend Variant Enum
// =============================================================================

/// Target relational engine flavor.
///
/// Affects DDL only: TimescaleDB tables use TIMESTAMPTZ timestamp columns and
/// are converted into hypertables after creation. ParadeDB behaves like plain
/// PostgreSQL at the DDL level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendVariant {
    #[default]
    Postgresql,
    Timescaledb,
    Paradedb,
}

impl BackendVariant {
    /// SQL type of the `start_timestamp` / `timestamp` columns.
    pub fn timestamp_type(self) -> &'static str {
        match self {
            BackendVariant::Postgresql => "TIMESTAMP",
            BackendVariant::Timescaledb => "TIMESTAMPTZ",
            BackendVariant::Paradedb => "TIMESTAMP",
        }
    }
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendVariant::Postgresql => write!(f, "postgresql"),
            BackendVariant::Timescaledb => write!(f, "timescaledb"),
            BackendVariant::Paradedb => write!(f, "paradedb"),
        }
    }
}

// =============================================================================
// PostgreSQL Connection Config
// =============================================================================

/// PostgreSQL connection configuration. A zero value for any pool knob means
/// "use the default".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostgresConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default)]
    pub max_connections: u32,
    /// Minimum number of connections to keep warm
    #[serde(default)]
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    #[serde(default)]
    pub acquire_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Max connection lifetime in seconds
    #[serde(default)]
    pub max_lifetime_secs: u64,
    /// Statement timeout in seconds (0 = disabled)
    #[serde(default)]
    pub statement_timeout_secs: u64,
}

/// Build a connection pool from configuration.
///
/// Pool bounds keep connections warm for low latency and cycle them to avoid
/// stale state; the statement timeout is set at the connection level so
/// runaway queries cannot hold a transaction open.
pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool, Error> {
    let url = config.url.as_str();
    if url.is_empty() {
        return Err(Error::Config("PostgreSQL URL is required".into()));
    }

    let max_connections = non_zero_or(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    let min_connections = non_zero_or(config.min_connections, DEFAULT_MIN_CONNECTIONS);
    let acquire_timeout = non_zero_or(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    let idle_timeout = non_zero_or(config.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
    let max_lifetime = non_zero_or(config.max_lifetime_secs, DEFAULT_MAX_LIFETIME_SECS);
    let statement_timeout =
        non_zero_or(config.statement_timeout_secs, DEFAULT_STATEMENT_TIMEOUT_SECS);

    let mut options: PgConnectOptions = url
        .parse()
        .map_err(|e| Error::Config(format!("Invalid PostgreSQL URL: {}", e)))?;

    options = options.log_statements(LevelFilter::Trace);

    if statement_timeout > 0 {
        options = options.options([("statement_timeout", format!("{}s", statement_timeout))]);
    }

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout))
        .idle_timeout(Duration::from_secs(idle_timeout))
        .max_lifetime(Duration::from_secs(max_lifetime))
        .connect_with(options)
        .await?;

    tracing::debug!(
        max_connections,
        min_connections,
        acquire_timeout_secs = acquire_timeout,
        statement_timeout_secs = statement_timeout,
        "PostgreSQL pool initialized"
    );
    Ok(pool)
}

fn non_zero_or<T: Default + PartialEq + Copy>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

// =============================================================================
// Exporter Config
// =============================================================================

/// Exporter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Target schema holding the metric tables and the attributes mapping
    /// table. Created by `ensure_schema` when auto-creation is enabled.
    pub schema: String,
    /// Prefix prepended to metric names when deriving physical table names.
    pub metrics_table_prefix: String,
    /// Backend flavor, selects timestamp column type and hypertable DDL.
    pub backend: BackendVariant,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            metrics_table_prefix: String::new(),
            backend: BackendVariant::default(),
        }
    }
}

impl ExporterConfig {
    /// Physical table name for a metric name.
    pub fn metric_table_name(&self, metric_name: &str) -> String {
        format!("{}{}", self.metrics_table_prefix, metric_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_type_by_backend() {
        assert_eq!(BackendVariant::Postgresql.timestamp_type(), "TIMESTAMP");
        assert_eq!(BackendVariant::Timescaledb.timestamp_type(), "TIMESTAMPTZ");
        assert_eq!(BackendVariant::Paradedb.timestamp_type(), "TIMESTAMP");
    }

    #[test]
    fn test_backend_variant_display() {
        assert_eq!(BackendVariant::Postgresql.to_string(), "postgresql");
        assert_eq!(BackendVariant::Timescaledb.to_string(), "timescaledb");
        assert_eq!(BackendVariant::Paradedb.to_string(), "paradedb");
    }

    #[test]
    fn test_backend_variant_deserializes_lowercase() {
        let variant: BackendVariant = serde_json::from_str("\"timescaledb\"").unwrap();
        assert_eq!(variant, BackendVariant::Timescaledb);
    }

    #[test]
    fn test_default_exporter_config() {
        let config = ExporterConfig::default();
        assert_eq!(config.schema, "otel");
        assert_eq!(config.metrics_table_prefix, "");
        assert_eq!(config.backend, BackendVariant::Postgresql);
    }

    #[test]
    fn test_metric_table_name_applies_prefix() {
        let config = ExporterConfig {
            metrics_table_prefix: "otel_".to_string(),
            ..Default::default()
        };
        assert_eq!(config.metric_table_name("cpu_usage"), "otel_cpu_usage");

        let bare = ExporterConfig::default();
        assert_eq!(bare.metric_table_name("cpu_usage"), "cpu_usage");
    }

    #[tokio::test]
    async fn test_connect_pool_requires_url() {
        let err = connect_pool(&PostgresConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_pool_rejects_invalid_url() {
        let config = PostgresConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        let err = connect_pool(&config).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
