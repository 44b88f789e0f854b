//! Metric table management
//!
//! One physical table per (schema, metric name), created lazily on first
//! insert. The column layout is fixed at creation time: shared base columns,
//! the 20 attribute value columns, and a type-specific tail. Attribute
//! discovery never alters table DDL; the attribute columns are part of the
//! base schema.

use sqlx::PgConnection;

use super::attrs::MAX_ATTRIBUTES;
use super::quote_ident;
use crate::config::BackendVariant;
use crate::error::Error;

/// Partitioning column for time-series backends.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Base columns shared by every metric table, in DDL order. The timestamp
/// column type is selected by backend variant.
pub(crate) fn base_columns(variant: BackendVariant) -> Vec<String> {
    let ts = variant.timestamp_type();

    let mut columns: Vec<String> = [
        "resource_url VARCHAR",
        "resource_attributes JSONB",
        "scope_name VARCHAR",
        "scope_version VARCHAR",
        "scope_attributes JSONB",
        "scope_dropped_attr_count INTEGER",
        "scope_url VARCHAR",
        "service_name VARCHAR",
        "name VARCHAR NOT NULL",
        "type INTEGER",
        "description VARCHAR",
        "unit VARCHAR",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    columns.push(format!("start_timestamp {ts}"));
    columns.push(format!("{TIMESTAMP_COLUMN} {ts} NOT NULL"));
    columns.extend((1..=MAX_ATTRIBUTES).map(|i| format!("attribute{i} VARCHAR")));
    columns.push("metadata JSONB".to_string());

    columns
}

fn metric_table_ddl(
    schema: &str,
    table: &str,
    variant: BackendVariant,
    type_columns: &[&str],
) -> String {
    let mut columns = base_columns(variant);
    columns.extend(type_columns.iter().map(|c| c.to_string()));
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} ({})",
        quote_ident(schema),
        quote_ident(table),
        columns.join(", ")
    )
}

fn hypertable_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT create_hypertable('{schema}.{table}', by_range('{TIMESTAMP_COLUMN}'), \
         migrate_data => true, if_not_exists => true)"
    )
}

/// Create one metric table. Idempotent: calling it for an existing table is a
/// no-op. For the TimescaleDB variant the table is additionally converted
/// into a hypertable partitioned by the timestamp column; if that secondary
/// statement fails, the table stays usable as a plain table.
pub async fn create_metric_table(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
    variant: BackendVariant,
    type_columns: &[&str],
) -> Result<(), Error> {
    let ddl = metric_table_ddl(schema, table, variant, type_columns);
    sqlx::query(&ddl).execute(&mut *conn).await?;

    if variant == BackendVariant::Timescaledb {
        let sql = hypertable_sql(schema, table);
        if let Err(e) = sqlx::query(&sql).execute(&mut *conn).await {
            tracing::warn!(
                schema,
                table,
                error = %e,
                "failed to convert metric table into a hypertable; keeping plain table"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_columns_count() {
        // 12 identity columns + 2 timestamps + 20 attribute slots + metadata.
        assert_eq!(base_columns(BackendVariant::Postgresql).len(), 35);
    }

    #[test]
    fn test_base_columns_timestamp_type_follows_variant() {
        let plain = base_columns(BackendVariant::Postgresql);
        assert!(plain.contains(&"timestamp TIMESTAMP NOT NULL".to_string()));
        assert!(plain.contains(&"start_timestamp TIMESTAMP".to_string()));

        let timescale = base_columns(BackendVariant::Timescaledb);
        assert!(timescale.contains(&"timestamp TIMESTAMPTZ NOT NULL".to_string()));
        assert!(timescale.contains(&"start_timestamp TIMESTAMPTZ".to_string()));
    }

    #[test]
    fn test_metric_table_ddl_appends_type_columns() {
        let ddl = metric_table_ddl(
            "otel",
            "cpu_usage",
            BackendVariant::Postgresql,
            &["value DOUBLE PRECISION", "flags INTEGER"],
        );
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"otel\".\"cpu_usage\""));
        assert!(ddl.contains("attribute20 VARCHAR"));
        assert!(ddl.contains("metadata JSONB, value DOUBLE PRECISION, flags INTEGER"));
    }

    #[test]
    fn test_hypertable_sql_targets_timestamp_column() {
        let sql = hypertable_sql("otel", "cpu_usage");
        assert!(sql.contains("create_hypertable('otel.cpu_usage'"));
        assert!(sql.contains("by_range('timestamp')"));
        assert!(sql.contains("if_not_exists => true"));
    }
}
