//! Target namespace (schema) management

use sqlx::PgExecutor;

use super::quote_ident;
use crate::error::Error;

/// Create the target schema if it does not exist. Safe to call from multiple
/// concurrent flushes.
pub async fn create_schema<'a, E>(executor: E, schema: &str) -> Result<(), Error>
where
    E: PgExecutor<'a>,
{
    if schema.is_empty() {
        return Err(Error::Config("schema name is required".into()));
    }

    let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema));
    sqlx::query(&sql).execute(executor).await?;

    Ok(())
}

/// Probe the backend catalog for a table in the target schema.
pub async fn table_exists<'a, E>(executor: E, schema: &str, table: &str) -> Result<bool, Error>
where
    E: PgExecutor<'a>,
{
    let (exists,) = sqlx::query_as::<_, (bool,)>(
        "SELECT EXISTS (SELECT 1 FROM pg_tables WHERE schemaname = $1 AND tablename = $2)",
    )
    .bind(schema)
    .bind(table)
    .fetch_one(executor)
    .await?;

    Ok(exists)
}
