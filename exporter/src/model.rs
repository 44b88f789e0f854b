//! Domain model for decoded OTLP metric records
//!
//! The host pipeline decodes the wire format; this crate receives records as
//! ([`ResourceMetadata`], [`MetricRecord`]) pairs. Payloads are a closed
//! tagged union over the five OTLP metric types, so routing is a pattern
//! match with compile-time exhaustiveness rather than a runtime type probe.
//!
//! Attribute maps use `serde_json::Map`, which preserves insertion order —
//! attribute slots are assigned in first-seen order, so iteration order is
//! load-bearing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Ordered string-keyed attribute map (resource/scope/data-point attributes,
/// metric metadata).
pub type AttrMap = serde_json::Map<String, JsonValue>;

/// Resource attribute key carrying the emitting service's name.
pub const SERVICE_NAME_ATTR: &str = "service.name";

/// Per-batch-resource metadata, shared by reference across every metric
/// record derived from that resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceMetadata {
    pub resource_url: String,
    pub resource_attributes: AttrMap,
    pub scope_name: String,
    pub scope_version: String,
    pub scope_attributes: AttrMap,
    pub scope_dropped_attr_count: u32,
    pub scope_url: String,
}

impl ResourceMetadata {
    /// `service.name` resource attribute, empty when absent.
    pub fn service_name(&self) -> &str {
        self.resource_attributes
            .get(SERVICE_NAME_ATTR)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }
}

/// OTLP metric type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Gauge,
    Sum,
    Histogram,
    ExponentialHistogram,
    Summary,
}

impl MetricType {
    /// Numeric tag stored in the `type` column (OTLP enum values).
    pub fn as_i32(self) -> i32 {
        match self {
            MetricType::Gauge => 1,
            MetricType::Sum => 2,
            MetricType::Histogram => 3,
            MetricType::ExponentialHistogram => 4,
            MetricType::Summary => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Sum => "sum",
            MetricType::Histogram => "histogram",
            MetricType::ExponentialHistogram => "exponential_histogram",
            MetricType::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation temporality of sum and histogram payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AggregationTemporality {
    #[default]
    Unspecified,
    Delta,
    Cumulative,
}

impl AggregationTemporality {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationTemporality::Unspecified => "unspecified",
            AggregationTemporality::Delta => "delta",
            AggregationTemporality::Cumulative => "cumulative",
        }
    }
}

impl fmt::Display for AggregationTemporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A number data point value. `Empty` means the point carried no value and
/// collapses to 0.0 in the `value` column.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NumberValue {
    Int(i64),
    Double(f64),
    #[default]
    Empty,
}

impl NumberValue {
    /// Collapse to the DOUBLE PRECISION `value` column.
    pub fn as_f64(self) -> f64 {
        match self {
            NumberValue::Int(v) => v as f64,
            NumberValue::Double(v) => v,
            NumberValue::Empty => 0.0,
        }
    }
}

/// Measurement exemplar, serialized into the `exemplars` JSONB column.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Exemplar {
    pub time: Option<DateTime<Utc>>,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    pub filtered_attributes: AttrMap,
}

/// Gauge / sum data point. A `time` of `None` models a zero TimeUnixNano on
/// the wire; such points are rejected at insert time.
#[derive(Debug, Clone, Default)]
pub struct NumberDataPoint {
    pub attributes: AttrMap,
    pub start_time: Option<DateTime<Utc>>,
    pub time: Option<DateTime<Utc>>,
    pub value: NumberValue,
    pub exemplars: Vec<Exemplar>,
    pub flags: u32,
}

/// Histogram data point with explicit bucket bounds.
#[derive(Debug, Clone, Default)]
pub struct HistogramDataPoint {
    pub attributes: AttrMap,
    pub start_time: Option<DateTime<Utc>>,
    pub time: Option<DateTime<Utc>>,
    pub count: u64,
    pub sum: Option<f64>,
    pub bucket_counts: Vec<u64>,
    pub explicit_bounds: Vec<f64>,
    pub exemplars: Vec<Exemplar>,
    pub flags: u32,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One side (positive or negative) of an exponential histogram.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExponentialHistogramBuckets {
    pub offset: i32,
    pub bucket_counts: Vec<u64>,
}

/// Exponential histogram data point.
#[derive(Debug, Clone, Default)]
pub struct ExponentialHistogramDataPoint {
    pub attributes: AttrMap,
    pub start_time: Option<DateTime<Utc>>,
    pub time: Option<DateTime<Utc>>,
    pub count: u64,
    pub sum: Option<f64>,
    pub scale: i32,
    pub zero_count: u64,
    pub positive: ExponentialHistogramBuckets,
    pub negative: ExponentialHistogramBuckets,
    pub exemplars: Vec<Exemplar>,
    pub flags: u32,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub zero_threshold: f64,
}

/// Quantile of a summary data point, serialized into `quantile_values`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QuantileValue {
    pub quantile: f64,
    pub value: f64,
}

/// Summary data point.
#[derive(Debug, Clone, Default)]
pub struct SummaryDataPoint {
    pub attributes: AttrMap,
    pub start_time: Option<DateTime<Utc>>,
    pub time: Option<DateTime<Utc>>,
    pub count: u64,
    pub sum: f64,
    pub quantile_values: Vec<QuantileValue>,
    pub flags: u32,
}

/// Type-specific metric payload.
#[derive(Debug, Clone)]
pub enum MetricData {
    Gauge {
        data_points: Vec<NumberDataPoint>,
    },
    Sum {
        data_points: Vec<NumberDataPoint>,
        aggregation_temporality: AggregationTemporality,
        is_monotonic: bool,
    },
    Histogram {
        data_points: Vec<HistogramDataPoint>,
        aggregation_temporality: AggregationTemporality,
    },
    ExponentialHistogram {
        data_points: Vec<ExponentialHistogramDataPoint>,
        aggregation_temporality: AggregationTemporality,
    },
    Summary {
        data_points: Vec<SummaryDataPoint>,
    },
}

impl MetricData {
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricData::Gauge { .. } => MetricType::Gauge,
            MetricData::Sum { .. } => MetricType::Sum,
            MetricData::Histogram { .. } => MetricType::Histogram,
            MetricData::ExponentialHistogram { .. } => MetricType::ExponentialHistogram,
            MetricData::Summary { .. } => MetricType::Summary,
        }
    }

    pub fn data_point_count(&self) -> usize {
        match self {
            MetricData::Gauge { data_points } => data_points.len(),
            MetricData::Sum { data_points, .. } => data_points.len(),
            MetricData::Histogram { data_points, .. } => data_points.len(),
            MetricData::ExponentialHistogram { data_points, .. } => data_points.len(),
            MetricData::Summary { data_points } => data_points.len(),
        }
    }
}

/// One named metric instrument from a decoded batch. Lives for the duration
/// of a single insert attempt.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    /// Metric name; also the physical table name within the target schema.
    pub name: String,
    pub description: String,
    pub unit: String,
    pub data: MetricData,
    pub metadata: AttrMap,
}
