//! Per-type metric accumulators and the insert engine
//!
//! Incoming records are fanned out by metric type into one accumulator per
//! type per export batch. On flush, each accumulator writes its buffered
//! metrics one transaction per metric name: ensure the table exists, resolve
//! the attribute mapping, insert the data points. Per-point failures
//! (attribute capacity, missing timestamp, marshal errors) are collected and
//! reported after the transaction commits — rows already written stay
//! written. Infrastructure failures abort that metric name's transaction
//! without blocking sibling metric names.

mod exp_histogram;
mod gauge;
mod histogram;
mod sum;
mod summary;

pub use exp_histogram::ExpHistogramGroup;
pub use gauge::GaugeGroup;
pub use histogram::HistogramGroup;
pub use sum::SumGroup;
pub use summary::SummaryGroup;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres};

use crate::config::ExporterConfig;
use crate::error::Error;
use crate::model::{AttrMap, MetricRecord, MetricType, ResourceMetadata};
use crate::store::attrs::{self, AttributesMapping, MAX_ATTRIBUTES, SlotValues};
use crate::store::quote_ident;

/// Capability shared by all per-type accumulators.
#[async_trait]
pub trait MetricsGroup: Send + Sync {
    /// Buffer one metric record. Rejects payloads that do not match the
    /// accumulator's metric type.
    fn add(&mut self, resource: Arc<ResourceMetadata>, record: MetricRecord) -> Result<(), Error>;

    /// Create the physical table for one buffered metric name. Idempotent.
    async fn create_table(&self, conn: &mut PgConnection, metric_name: &str) -> Result<(), Error>;

    /// Flush all buffered metrics, joining per-metric and per-point errors.
    async fn insert(&self, pool: &PgPool) -> Result<(), Error>;

    /// Names of all buffered metrics.
    fn metric_names(&self) -> Vec<String>;

    /// Total buffered data points.
    fn data_point_count(&self) -> usize;
}

/// One buffered metric instrument awaiting flush.
pub(crate) struct BufferedMetric<P> {
    pub resource: Arc<ResourceMetadata>,
    pub name: String,
    pub description: String,
    pub unit: String,
    pub metadata: AttrMap,
    pub points: Vec<P>,
}

/// Routes incoming metric records into one accumulator per OTLP metric type.
/// One instance per export batch.
pub struct MetricGroups {
    gauge: GaugeGroup,
    sum: SumGroup,
    histogram: HistogramGroup,
    exp_histogram: ExpHistogramGroup,
    summary: SummaryGroup,
}

impl MetricGroups {
    pub fn new(config: &ExporterConfig) -> Self {
        Self {
            gauge: GaugeGroup::new(config.clone()),
            sum: SumGroup::new(config.clone()),
            histogram: HistogramGroup::new(config.clone()),
            exp_histogram: ExpHistogramGroup::new(config.clone()),
            summary: SummaryGroup::new(config.clone()),
        }
    }

    /// Route one record to the accumulator for its payload type.
    pub fn add(&mut self, resource: Arc<ResourceMetadata>, record: MetricRecord) -> Result<(), Error> {
        match record.data.metric_type() {
            MetricType::Gauge => self.gauge.add(resource, record),
            MetricType::Sum => self.sum.add(resource, record),
            MetricType::Histogram => self.histogram.add(resource, record),
            MetricType::ExponentialHistogram => self.exp_histogram.add(resource, record),
            MetricType::Summary => self.summary.add(resource, record),
        }
    }

    /// Total buffered data points across all accumulators.
    pub fn data_point_count(&self) -> usize {
        self.groups().iter().map(|g| g.data_point_count()).sum()
    }

    /// Flush every accumulator. Failures are joined, never short-circuited:
    /// one metric type's failure does not block the others.
    pub async fn insert_all(&self, pool: &PgPool) -> Result<(), Error> {
        let mut errors = Vec::new();

        for group in self.groups() {
            if let Err(e) = group.insert(pool).await {
                errors.push(e);
            }
        }

        Error::joined_result(errors)
    }

    fn groups(&self) -> [&dyn MetricsGroup; 5] {
        [
            &self.gauge,
            &self.sum,
            &self.histogram,
            &self.exp_histogram,
            &self.summary,
        ]
    }
}

/// Build the parameterized INSERT statement for one metric table: base
/// columns, the 20 attribute slots, metadata, then the type-specific tail.
pub(crate) fn build_insert_sql(schema: &str, table: &str, type_columns: &[&str]) -> String {
    let mut columns: Vec<String> = [
        "resource_url",
        "resource_attributes",
        "scope_name",
        "scope_version",
        "scope_attributes",
        "scope_dropped_attr_count",
        "scope_url",
        "service_name",
        "name",
        "type",
        "description",
        "unit",
        "start_timestamp",
        "timestamp",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    columns.extend((1..=MAX_ATTRIBUTES).map(|i| format!("attribute{i}")));
    columns.push("metadata".to_string());
    columns.extend(type_columns.iter().map(|c| c.to_string()));

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();

    format!(
        "INSERT INTO {}.{} ({}) VALUES ({})",
        quote_ident(schema),
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Values shared by every row of one data point: resource/scope identity,
/// metric identity, timestamps, and the slot-ordered attribute values.
pub(crate) struct BaseRow<'a> {
    pub resource: &'a ResourceMetadata,
    pub resource_attributes: &'a JsonValue,
    pub scope_attributes: &'a JsonValue,
    pub metadata: &'a JsonValue,
    pub name: &'a str,
    pub metric_type: MetricType,
    pub description: &'a str,
    pub unit: &'a str,
    pub start_time: Option<DateTime<Utc>>,
    pub time: DateTime<Utc>,
    pub attributes: SlotValues,
}

/// Bind the base column values in statement order. Type-specific values are
/// chained on by the caller.
pub(crate) fn bind_base<'q>(
    query: Query<'q, Postgres, PgArguments>,
    row: &'q BaseRow<'q>,
) -> Query<'q, Postgres, PgArguments> {
    let mut query = query
        .bind(&row.resource.resource_url)
        .bind(row.resource_attributes)
        .bind(&row.resource.scope_name)
        .bind(&row.resource.scope_version)
        .bind(row.scope_attributes)
        .bind(row.resource.scope_dropped_attr_count as i32)
        .bind(&row.resource.scope_url)
        .bind(row.resource.service_name())
        .bind(row.name)
        .bind(row.metric_type.as_i32())
        .bind(row.description)
        .bind(row.unit)
        .bind(row.start_time)
        .bind(row.time);

    for value in &row.attributes {
        query = query.bind(value.as_deref());
    }

    query.bind(row.metadata)
}

/// Resolve the attribute mapping for one data point, persisting the slot
/// vector whenever a new slot was assigned — before the data row that relies
/// on it. Operates on the caller's per-transaction working copy; the caller
/// publishes that copy to its shared map only after the transaction commits,
/// so a rollback discards staged assignments instead of leaving them looking
/// persisted.
pub(crate) async fn resolve_point_attributes(
    conn: &mut PgConnection,
    schema: &str,
    mapping: &mut AttributesMapping,
    attributes: &AttrMap,
) -> Result<SlotValues, Error> {
    let (values, changed) = mapping.resolve(attributes)?;

    if changed {
        attrs::update_mapping(&mut *conn, schema, &*mapping).await?;
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetricData, NumberDataPoint};

    fn gauge_record(name: &str, points: usize) -> MetricRecord {
        MetricRecord {
            name: name.to_string(),
            description: String::new(),
            unit: String::new(),
            data: MetricData::Gauge {
                data_points: vec![NumberDataPoint::default(); points],
            },
            metadata: AttrMap::new(),
        }
    }

    fn sum_record(name: &str, points: usize) -> MetricRecord {
        MetricRecord {
            name: name.to_string(),
            description: String::new(),
            unit: String::new(),
            data: MetricData::Sum {
                data_points: vec![NumberDataPoint::default(); points],
                aggregation_temporality: Default::default(),
                is_monotonic: false,
            },
            metadata: AttrMap::new(),
        }
    }

    #[test]
    fn test_build_insert_sql_gauge_shape() {
        let sql = build_insert_sql("otel", "cpu_usage", &["value", "exemplars", "flags"]);
        assert!(sql.starts_with("INSERT INTO \"otel\".\"cpu_usage\""));
        // 14 base + 20 attribute + metadata + 3 type-specific = 38 parameters.
        assert!(sql.contains("$38"));
        assert!(!sql.contains("$39"));
        assert!(sql.contains("metadata, value, exemplars, flags"));
    }

    #[test]
    fn test_multiplexer_routes_by_payload_type() {
        let mut groups = MetricGroups::new(&ExporterConfig::default());
        let resource = Arc::new(ResourceMetadata::default());

        groups.add(Arc::clone(&resource), gauge_record("g", 2)).unwrap();
        groups.add(Arc::clone(&resource), sum_record("s", 3)).unwrap();

        assert_eq!(groups.gauge.data_point_count(), 2);
        assert_eq!(groups.sum.data_point_count(), 3);
        assert_eq!(groups.histogram.data_point_count(), 0);
        assert_eq!(groups.data_point_count(), 5);
    }

    #[test]
    fn test_metric_names_follow_buffered_records() {
        let mut groups = MetricGroups::new(&ExporterConfig::default());
        let resource = Arc::new(ResourceMetadata::default());

        groups.add(Arc::clone(&resource), gauge_record("a", 1)).unwrap();
        groups.add(resource, gauge_record("b", 1)).unwrap();

        assert_eq!(groups.gauge.metric_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_insert_all_short_circuits_empty_batch() {
        // connect_lazy performs no I/O; every group is empty so no statement
        // is ever issued.
        let pool = PgPool::connect_lazy("postgresql://localhost/unused").unwrap();
        let groups = MetricGroups::new(&ExporterConfig::default());
        assert!(groups.insert_all(&pool).await.is_ok());
    }
}
