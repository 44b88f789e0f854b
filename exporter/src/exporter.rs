//! Exporter entry point
//!
//! Owns the connection pool and the target configuration. A caller decodes
//! OTLP batches into ([`ResourceMetadata`], [`MetricRecord`]) pairs and hands
//! them to [`MetricsExporter::push_metrics`]; the exporter fans them out by
//! metric type and flushes one transaction per metric name. Failures are
//! joined and reported together with whatever did commit left in place.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{self, ExporterConfig, PostgresConfig};
use crate::error::Error;
use crate::groups::MetricGroups;
use crate::model::{MetricRecord, ResourceMetadata};
use crate::store::{attrs, schema};

/// Writes decoded OTLP metrics into PostgreSQL, one table per metric name.
#[derive(Debug)]
pub struct MetricsExporter {
    pool: PgPool,
    config: ExporterConfig,
}

impl MetricsExporter {
    /// Connect to PostgreSQL and create an exporter over the new pool.
    pub async fn connect(config: ExporterConfig, postgres: &PostgresConfig) -> Result<Self, Error> {
        let pool = config::connect_pool(postgres).await?;
        Ok(Self::from_pool(config, pool))
    }

    /// Create an exporter over an existing pool.
    pub fn from_pool(config: ExporterConfig, pool: PgPool) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the target schema and the attribute mappings table. Idempotent;
    /// call once at startup before the first batch.
    pub async fn ensure_schema(&self) -> Result<(), Error> {
        schema::create_schema(&self.pool, &self.config.schema).await?;
        attrs::create_mappings_table(&self.pool, &self.config.schema).await?;
        tracing::debug!(schema = %self.config.schema, "metrics schema ready");
        Ok(())
    }

    /// A fresh accumulator set for one export batch.
    pub fn new_groups(&self) -> MetricGroups {
        MetricGroups::new(&self.config)
    }

    /// Export one decoded batch: route every record into its per-type
    /// accumulator, then flush everything. Routing and flush errors are
    /// joined so a bad record never blocks the rest of the batch.
    pub async fn push_metrics(
        &self,
        batch: Vec<(Arc<ResourceMetadata>, Vec<MetricRecord>)>,
    ) -> Result<(), Error> {
        let mut groups = self.new_groups();
        let mut errors = Vec::new();

        for (resource, records) in batch {
            for record in records {
                if let Err(e) = groups.add(Arc::clone(&resource), record) {
                    errors.push(e);
                }
            }
        }

        tracing::debug!(
            data_points = groups.data_point_count(),
            "pushing metrics batch"
        );

        if let Err(e) = groups.insert_all(&self.pool).await {
            errors.push(e);
        }

        Error::joined_result(errors)
    }

    /// Flush an externally assembled accumulator set.
    pub async fn insert_metrics(&self, groups: &MetricGroups) -> Result<(), Error> {
        groups.insert_all(&self.pool).await
    }

    /// Close the pool, waiting for in-flight connections to be released.
    pub async fn close(&self) {
        tracing::debug!("closing metrics exporter pool");
        self.pool.close().await;
    }
}
