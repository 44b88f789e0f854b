//! Summary metric accumulator
//!
//! Summaries are buffered and their tables can be created, but the insert
//! body is not implemented yet: flushing a non-empty batch reports an
//! explicit unsupported-type error.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::{BufferedMetric, MetricsGroup};
use crate::config::ExporterConfig;
use crate::error::Error;
use crate::model::{MetricData, MetricRecord, MetricType, ResourceMetadata, SummaryDataPoint};
use crate::store::tables;

pub(crate) const SUMMARY_TABLE_COLUMNS: &[&str] = &[
    "count BIGINT",
    "sum DOUBLE PRECISION",
    "quantile_values JSONB",
    "flags INTEGER",
];

/// Accumulates summary metrics for one export batch.
pub struct SummaryGroup {
    config: ExporterConfig,
    metrics: Vec<BufferedMetric<SummaryDataPoint>>,
    count: usize,
}

impl SummaryGroup {
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            metrics: Vec::new(),
            count: 0,
        }
    }
}

#[async_trait]
impl MetricsGroup for SummaryGroup {
    fn add(&mut self, resource: Arc<ResourceMetadata>, record: MetricRecord) -> Result<(), Error> {
        let MetricData::Summary { data_points } = record.data else {
            return Err(Error::TypeMismatch {
                expected: MetricType::Summary,
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
            SUMMARY_TABLE_COLUMNS,
        )
        .await
    }

    async fn insert(&self, _pool: &PgPool) -> Result<(), Error> {
        tracing::debug!(count = self.count, "inserting summary metrics");

        if self.count == 0 {
            return Ok(());
        }

        Err(Error::Unsupported(MetricType::Summary))
    }

    fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }

    fn data_point_count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttrMap;

    fn record(points: usize) -> MetricRecord {
        MetricRecord {
            name: "gc_pause".to_string(),
            description: String::new(),
            unit: "s".to_string(),
            data: MetricData::Summary {
                data_points: vec![SummaryDataPoint::default(); points],
            },
            metadata: AttrMap::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_with_data_reports_unsupported() {
        let pool = PgPool::connect_lazy("postgresql://localhost/unused").unwrap();
        let mut group = SummaryGroup::new(ExporterConfig::default());
        group
            .add(Arc::new(ResourceMetadata::default()), record(1))
            .unwrap();

        let err = group.insert(&pool).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(MetricType::Summary)));
    }

    #[tokio::test]
    async fn test_insert_empty_group_is_a_no_op() {
        let pool = PgPool::connect_lazy("postgresql://localhost/unused").unwrap();
        let group = SummaryGroup::new(ExporterConfig::default());
        assert!(group.insert(&pool).await.is_ok());
    }
}
