//! Histogram metric accumulator
//!
//! Histograms are buffered and their tables can be created, but the insert
//! body is not implemented yet: flushing a non-empty batch reports an
//! explicit unsupported-type error instead of silently dropping the points.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::{BufferedMetric, MetricsGroup};
use crate::config::ExporterConfig;
use crate::error::Error;
use crate::model::{HistogramDataPoint, MetricData, MetricRecord, MetricType, ResourceMetadata};
use crate::store::tables;

pub(crate) const HISTOGRAM_TABLE_COLUMNS: &[&str] = &[
    "count BIGINT",
    "sum DOUBLE PRECISION",
    "bucket_counts JSONB",
    "explicit_bounds JSONB",
    "exemplars JSONB",
    "flags INTEGER",
    "min DOUBLE PRECISION",
    "max DOUBLE PRECISION",
    "aggregation_temporality VARCHAR",
];

/// Accumulates histogram metrics for one export batch.
pub struct HistogramGroup {
    config: ExporterConfig,
    metrics: Vec<BufferedMetric<HistogramDataPoint>>,
    count: usize,
}

impl HistogramGroup {
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            metrics: Vec::new(),
            count: 0,
        }
    }
}

#[async_trait]
impl MetricsGroup for HistogramGroup {
    fn add(&mut self, resource: Arc<ResourceMetadata>, record: MetricRecord) -> Result<(), Error> {
        let MetricData::Histogram { data_points, .. } = record.data else {
            return Err(Error::TypeMismatch {
                expected: MetricType::Histogram,
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
            HISTOGRAM_TABLE_COLUMNS,
        )
        .await
    }

    async fn insert(&self, _pool: &PgPool) -> Result<(), Error> {
        tracing::debug!(count = self.count, "inserting histogram metrics");

        if self.count == 0 {
            return Ok(());
        }

        Err(Error::Unsupported(MetricType::Histogram))
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
    use crate::model::{AggregationTemporality, AttrMap};

    fn record(points: usize) -> MetricRecord {
        MetricRecord {
            name: "request_duration".to_string(),
            description: String::new(),
            unit: "s".to_string(),
            data: MetricData::Histogram {
                data_points: vec![HistogramDataPoint::default(); points],
                aggregation_temporality: AggregationTemporality::Cumulative,
            },
            metadata: AttrMap::new(),
        }
    }

    #[test]
    fn test_add_buffers_points() {
        let mut group = HistogramGroup::new(ExporterConfig::default());
        group
            .add(Arc::new(ResourceMetadata::default()), record(3))
            .unwrap();

        assert_eq!(group.data_point_count(), 3);
        assert_eq!(group.metric_names(), vec!["request_duration"]);
    }

    #[tokio::test]
    async fn test_insert_with_data_reports_unsupported() {
        let pool = PgPool::connect_lazy("postgresql://localhost/unused").unwrap();
        let mut group = HistogramGroup::new(ExporterConfig::default());
        group
            .add(Arc::new(ResourceMetadata::default()), record(1))
            .unwrap();

        let err = group.insert(&pool).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(MetricType::Histogram)));
    }

    #[tokio::test]
    async fn test_insert_empty_group_is_a_no_op() {
        let pool = PgPool::connect_lazy("postgresql://localhost/unused").unwrap();
        let group = HistogramGroup::new(ExporterConfig::default());
        assert!(group.insert(&pool).await.is_ok());
    }
}
