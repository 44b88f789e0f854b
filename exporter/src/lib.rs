//! Schema-on-write PostgreSQL persistence for OpenTelemetry metrics
//!
//! Persists decoded OTLP metric records into PostgreSQL (or TimescaleDB /
//! ParadeDB), creating one physical table per metric name on first sight and
//! mapping each metric's dynamically discovered attribute keys onto a fixed
//! set of physical columns (`attribute1..attribute20`).
//!
//! The host pipeline is an external collaborator: it decodes OTLP batches into
//! ([`ResourceMetadata`], [`MetricRecord`]) pairs and hands them to
//! [`MetricsExporter::push_metrics`]. Everything below that call — attribute
//! slot management, lazy table creation, per-metric transactions with
//! partial-failure tolerance — lives in this crate.

pub mod config;
pub mod error;
pub mod exporter;
pub mod groups;
pub mod model;
pub mod store;

pub use config::{BackendVariant, ExporterConfig, PostgresConfig};
pub use error::Error;
pub use exporter::MetricsExporter;
pub use groups::{MetricGroups, MetricsGroup};
pub use model::{MetricData, MetricRecord, MetricType, ResourceMetadata};
