//! Sum metric accumulator

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
use crate::model::{
    AggregationTemporality, MetricData, MetricRecord, MetricType, NumberDataPoint,
    ResourceMetadata,
};
use crate::store::attrs::{self, AttributesMapping};
use crate::store::{schema, tables};

pub(crate) const SUM_TABLE_COLUMNS: &[&str] = &[
    "value DOUBLE PRECISION",
    "exemplars JSONB",
    "flags INTEGER",
    "aggregation_temporality VARCHAR",
    "is_monotonic BOOLEAN",
];

const SUM_INSERT_COLUMNS: &[&str] = &[
    "value",
    "exemplars",
    "flags",
    "aggregation_temporality",
    "is_monotonic",
];

struct SumMetric {
    inner: BufferedMetric<NumberDataPoint>,
    aggregation_temporality: AggregationTemporality,
    is_monotonic: bool,
}

/// Accumulates sum (counter) metrics for one export batch.
pub struct SumGroup {
    config: ExporterConfig,
    metrics: Vec<SumMetric>,
    count: usize,
}

impl SumGroup {
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            metrics: Vec::new(),
            count: 0,
        }
    }

    async fn insert_metric(
        &self,
        pool: &PgPool,
        metric: &SumMetric,
        mappings: &mut HashMap<String, AttributesMapping>,
    ) -> Result<(), Error> {
        let inner = &metric.inner;
        let table = self.config.metric_table_name(&inner.name);
        let mut tx = pool.begin().await?;

        if !schema::table_exists(&mut *tx, &self.config.schema, &table).await? {
            self.create_table(&mut tx, &inner.name).await?;
        }

        // Work on a copy of the mapping; the shared map is updated only after
        // the transaction commits, so a rollback discards staged assignments
        // along with the rolled-back mapping row.
        let mut mapping = match mappings.get(&inner.name) {
            Some(mapping) => mapping.clone(),
            None => {
                attrs::insert_mapping(&mut *tx, &self.config.schema, &inner.name).await?;
                AttributesMapping::new(inner.name.as_str())
            }
        };

        let insert_sql = build_insert_sql(&self.config.schema, &table, SUM_INSERT_COLUMNS);

        let resource_attributes = JsonValue::Object(inner.resource.resource_attributes.clone());
        let scope_attributes = JsonValue::Object(inner.resource.scope_attributes.clone());
        let metadata = JsonValue::Object(inner.metadata.clone());

        let mut soft_errors = Vec::new();

        for point in &inner.points {
            let Some(time) = point.time else {
                soft_errors.push(Error::ZeroTimestamp {
                    metric: inner.name.clone(),
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
                resource: &inner.resource,
                resource_attributes: &resource_attributes,
                scope_attributes: &scope_attributes,
                metadata: &metadata,
                name: &inner.name,
                metric_type: MetricType::Sum,
                description: &inner.description,
                unit: &inner.unit,
                start_time: point.start_time,
                time,
                attributes,
            };

            bind_base(sqlx::query(&insert_sql), &row)
                .bind(point.value.as_f64())
                .bind(&exemplars)
                .bind(point.flags as i32)
                .bind(metric.aggregation_temporality.as_str())
                .bind(metric.is_monotonic)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        mappings.insert(inner.name.clone(), mapping);

        Error::joined_result(soft_errors)
    }
}

#[async_trait]
impl MetricsGroup for SumGroup {
    fn add(&mut self, resource: Arc<ResourceMetadata>, record: MetricRecord) -> Result<(), Error> {
        let MetricData::Sum {
            data_points,
            aggregation_temporality,
            is_monotonic,
        } = record.data
        else {
            return Err(Error::TypeMismatch {
                expected: MetricType::Sum,
                actual: record.data.metric_type(),
            });
        };

        self.count += data_points.len();
        self.metrics.push(SumMetric {
            inner: BufferedMetric {
                resource,
                name: record.name,
                description: record.description,
                unit: record.unit,
                metadata: record.metadata,
                points: data_points,
            },
            aggregation_temporality,
            is_monotonic,
        });

        Ok(())
    }

    async fn create_table(&self, conn: &mut PgConnection, metric_name: &str) -> Result<(), Error> {
        tables::create_metric_table(
            conn,
            &self.config.schema,
            &self.config.metric_table_name(metric_name),
            self.config.backend,
            SUM_TABLE_COLUMNS,
        )
        .await
    }

    async fn insert(&self, pool: &PgPool) -> Result<(), Error> {
        tracing::debug!(count = self.count, "inserting sum metrics");

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
        self.metrics.iter().map(|m| m.inner.name.clone()).collect()
    }

    fn data_point_count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttrMap;

    #[test]
    fn test_add_keeps_payload_level_fields() {
        let mut group = SumGroup::new(ExporterConfig::default());
        let resource = Arc::new(ResourceMetadata::default());

        group
            .add(
                resource,
                MetricRecord {
                    name: "requests_total".to_string(),
                    description: String::new(),
                    unit: "1".to_string(),
                    data: MetricData::Sum {
                        data_points: vec![NumberDataPoint::default()],
                        aggregation_temporality: AggregationTemporality::Cumulative,
                        is_monotonic: true,
                    },
                    metadata: AttrMap::new(),
                },
            )
            .unwrap();

        assert_eq!(group.data_point_count(), 1);
        let metric = &group.metrics[0];
        assert_eq!(
            metric.aggregation_temporality,
            AggregationTemporality::Cumulative
        );
        assert!(metric.is_monotonic);
    }

    #[test]
    fn test_add_rejects_gauge_payload() {
        let mut group = SumGroup::new(ExporterConfig::default());
        let resource = Arc::new(ResourceMetadata::default());

        let err = group
            .add(
                resource,
                MetricRecord {
                    name: "g".to_string(),
                    description: String::new(),
                    unit: String::new(),
                    data: MetricData::Gauge {
                        data_points: Vec::new(),
                    },
                    metadata: AttrMap::new(),
                },
            )
            .unwrap_err();

        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: MetricType::Sum,
                actual: MetricType::Gauge,
            }
        ));
    }

    #[test]
    fn test_sum_insert_columns_extend_gauge_shape() {
        let sql = build_insert_sql("otel", "requests_total", SUM_INSERT_COLUMNS);
        // 14 base + 20 attribute + metadata + 5 type-specific = 40 parameters.
        assert!(sql.contains("$40"));
        assert!(sql.contains("aggregation_temporality, is_monotonic"));
    }
}
