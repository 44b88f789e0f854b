//! Exponential histogram metric accumulator
//!
//! Same status as the plain histogram group: records are buffered and tables
//! can be created, but flushing a non-empty batch reports an explicit
//! unsupported-type error.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::{BufferedMetric, MetricsGroup};
use crate::config::ExporterConfig;
use crate::error::Error;
use crate::model::{
    ExponentialHistogramDataPoint, MetricData, MetricRecord, MetricType, ResourceMetadata,
};
use crate::store::tables;

pub(crate) const EXP_HISTOGRAM_TABLE_COLUMNS: &[&str] = &[
    "count BIGINT",
    "sum DOUBLE PRECISION",
    "scale INTEGER",
    "zero_count BIGINT",
    "positive_offset INTEGER",
    "positive_bucket_counts JSONB",
    "negative_offset INTEGER",
    "negative_bucket_counts JSONB",
    "exemplars JSONB",
    "flags INTEGER",
    "min DOUBLE PRECISION",
    "max DOUBLE PRECISION",
    "zero_threshold DOUBLE PRECISION",
    "aggregation_temporality VARCHAR",
];

/// Accumulates exponential histogram metrics for one export batch.
pub struct ExpHistogramGroup {
    config: ExporterConfig,
    metrics: Vec<BufferedMetric<ExponentialHistogramDataPoint>>,
    count: usize,
}

impl ExpHistogramGroup {
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            metrics: Vec::new(),
            count: 0,
        }
    }
}

#[async_trait]
impl MetricsGroup for ExpHistogramGroup {
    fn add(&mut self, resource: Arc<ResourceMetadata>, record: MetricRecord) -> Result<(), Error> {
        let MetricData::ExponentialHistogram { data_points, .. } = record.data else {
            return Err(Error::TypeMismatch {
                expected: MetricType::ExponentialHistogram,
                actual: record.data.metric_type(),
            });
        };

        self.count += data_points.len();
        self.metrics.push(BufferedMetric {
            resource,
            name: record.name,
            description: record.description,
            unit: record.unit,
            metadata: record.metadata,
            points: data_points,
        });

        Ok(())
    }

    async fn create_table(&self, conn: &mut PgConnection, metric_name: &str) -> Result<(), Error> {
        tables::create_metric_table(
            conn,
            &self.config.schema,
            &self.config.metric_table_name(metric_name),
            self.config.backend,
            EXP_HISTOGRAM_TABLE_COLUMNS,
        )
        .await
    }

    async fn insert(&self, _pool: &PgPool) -> Result<(), Error> {
        tracing::debug!(count = self.count, "inserting exponential histogram metrics");

        if self.count == 0 {
            return Ok(());
        }

        Err(Error::Unsupported(MetricType::ExponentialHistogram))
    }

    fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }

    fn data_point_count(&self) -> usize {
        self.count
    }
}
