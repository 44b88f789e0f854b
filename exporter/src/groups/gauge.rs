//! Gauge metric accumulator

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};

use super::{
    BaseRow, BufferedMetric, MetricsGroup, bind_base, build_insert_sql, resolve_point_attributes,
};
use crate::config::ExporterConfig;
use crate::error::Error;
use crate::model::{MetricData, MetricRecord, MetricType, NumberDataPoint, ResourceMetadata};
use crate::store::attrs::{self, AttributesMapping};
use crate::store::{schema, tables};

pub(crate) const GAUGE_TABLE_COLUMNS: &[&str] = &[
    "value DOUBLE PRECISION",
    "exemplars JSONB",
    "flags INTEGER",
];

const GAUGE_INSERT_COLUMNS: &[&str] = &["value", "exemplars", "flags"];

/// Accumulates gauge metrics for one export batch.
pub struct GaugeGroup {
    config: ExporterConfig,
    metrics: Vec<BufferedMetric<NumberDataPoint>>,
    count: usize,
}

impl GaugeGroup {
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            metrics: Vec::new(),
            count: 0,
        }
    }

    /// Write one buffered metric's data points inside a single transaction.
    /// Soft per-point errors are returned after the commit; infrastructure
    /// errors abort the transaction.
    async fn insert_metric(
        &self,
        pool: &PgPool,
        metric: &BufferedMetric<NumberDataPoint>,
        mappings: &mut HashMap<String, AttributesMapping>,
    ) -> Result<(), Error> {
        let table = self.config.metric_table_name(&metric.name);
        let mut tx = pool.begin().await?;

        if !schema::table_exists(&mut *tx, &self.config.schema, &table).await? {
            self.create_table(&mut tx, &metric.name).await?;
        }

        // Work on a copy of the mapping; the shared map is updated only after
        // the transaction commits, so a rollback discards staged assignments
        // along with the rolled-back mapping row.
        let mut mapping = match mappings.get(&metric.name) {
            Some(mapping) => mapping.clone(),
            None => {
                attrs::insert_mapping(&mut *tx, &self.config.schema, &metric.name).await?;
                AttributesMapping::new(metric.name.as_str())
            }
        };

        let insert_sql = build_insert_sql(&self.config.schema, &table, GAUGE_INSERT_COLUMNS);

        let resource_attributes = JsonValue::Object(metric.resource.resource_attributes.clone());
        let scope_attributes = JsonValue::Object(metric.resource.scope_attributes.clone());
        let metadata = JsonValue::Object(metric.metadata.clone());

        let mut soft_errors = Vec::new();

        for point in &metric.points {
            let Some(time) = point.time else {
                soft_errors.push(Error::ZeroTimestamp {
                    metric: metric.name.clone(),
                });
                continue;
            };

            let attributes = match resolve_point_attributes(
                &mut tx,
                &self.config.schema,
                &mut mapping,
                &point.attributes,
            )
            .await
            {
                Ok(values) => values,
                Err(e @ Error::Database(_)) => return Err(e),
                Err(e) => {
                    soft_errors.push(e);
                    continue;
                }
            };

            let exemplars = match serde_json::to_value(&point.exemplars) {
                Ok(v) => v,
                Err(e) => {
                    soft_errors.push(Error::Json(e));
                    continue;
                }
            };

            let row = BaseRow {
                resource: &metric.resource,
                resource_attributes: &resource_attributes,
                scope_attributes: &scope_attributes,
                metadata: &metadata,
                name: &metric.name,
                metric_type: MetricType::Gauge,
                description: &metric.description,
                unit: &metric.unit,
                start_time: point.start_time,
                time,
                attributes,
            };

            bind_base(sqlx::query(&insert_sql), &row)
                .bind(point.value.as_f64())
                .bind(&exemplars)
                .bind(point.flags as i32)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        mappings.insert(metric.name.clone(), mapping);

        Error::joined_result(soft_errors)
    }
}

#[async_trait]
impl MetricsGroup for GaugeGroup {
    fn add(&mut self, resource: Arc<ResourceMetadata>, record: MetricRecord) -> Result<(), Error> {
        let MetricData::Gauge { data_points } = record.data else {
            return Err(Error::TypeMismatch {
                expected: MetricType::Gauge,
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
            GAUGE_TABLE_COLUMNS,
        )
        .await
    }

    async fn insert(&self, pool: &PgPool) -> Result<(), Error> {
        tracing::debug!(count = self.count, "inserting gauge metrics");

        if self.count == 0 {
            return Ok(());
        }

        let mut mappings = attrs::group_by_name(
            attrs::fetch_mappings(pool, &self.config.schema, &self.metric_names()).await?,
        );

        let mut errors = Vec::new();
        for metric in &self.metrics {
            if let Err(e) = self.insert_metric(pool, metric, &mut mappings).await {
                errors.push(e);
            }
        }

        Error::joined_result(errors)
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
    use crate::model::{AttrMap, NumberValue, SummaryDataPoint};

    fn record(name: &str, data: MetricData) -> MetricRecord {
        MetricRecord {
            name: name.to_string(),
            description: "desc".to_string(),
            unit: "1".to_string(),
            data,
            metadata: AttrMap::new(),
        }
    }

    #[test]
    fn test_add_counts_data_points() {
        let mut group = GaugeGroup::new(ExporterConfig::default());
        let resource = Arc::new(ResourceMetadata::default());

        group
            .add(
                Arc::clone(&resource),
                record(
                    "cpu_usage",
                    MetricData::Gauge {
                        data_points: vec![
                            NumberDataPoint {
                                value: NumberValue::Double(0.5),
                                ..Default::default()
                            },
                            NumberDataPoint::default(),
                        ],
                    },
                ),
            )
            .unwrap();

        assert_eq!(group.data_point_count(), 2);
        assert_eq!(group.metric_names(), vec!["cpu_usage"]);
    }

    #[test]
    fn test_add_rejects_mismatched_payload() {
        let mut group = GaugeGroup::new(ExporterConfig::default());
        let resource = Arc::new(ResourceMetadata::default());

        let err = group
            .add(
                resource,
                record(
                    "latency",
                    MetricData::Summary {
                        data_points: vec![SummaryDataPoint::default()],
                    },
                ),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: MetricType::Gauge,
                actual: MetricType::Summary,
            }
        ));
        assert_eq!(group.data_point_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_empty_group_is_a_no_op() {
        let pool = PgPool::connect_lazy("postgresql://localhost/unused").unwrap();
        let group = GaugeGroup::new(ExporterConfig::default());
        assert!(group.insert(&pool).await.is_ok());
    }
}
