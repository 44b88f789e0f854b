//! Exporter error types
//!
//! Per-point failures (attribute capacity, missing timestamps, marshal
//! errors) are soft: the offending data point is skipped and the error is
//! joined into the batch result after the surrounding transaction commits.
//! Infrastructure failures abort the transaction for that metric name.

use thiserror::Error;

use crate::model::MetricType;

#[derive(Error, Debug)]
pub enum Error {
    /// More distinct attribute keys than the fixed slot capacity for one
    /// metric name. The offending data point is skipped, siblings proceed.
    #[error("attribute slot capacity exceeded for metric '{metric}'")]
    AttributeCapacity { metric: String },

    /// Data points with a zero value for TimeUnixNano are rejected.
    #[error("data point for metric '{metric}' has no event timestamp and was rejected")]
    ZeroTimestamp { metric: String },

    /// Payload handed to an accumulator of a different metric type.
    #[error("metric payload is not {expected} (got {actual})")]
    TypeMismatch {
        expected: MetricType,
        actual: MetricType,
    },

    /// Insert path not implemented for this metric type. Distinct from
    /// "nothing to insert": an empty accumulator flushes cleanly.
    #[error("insert is not implemented for {0} metrics")]
    Unsupported(MetricType),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Aggregation of independent failures from one flush. No contributing
    /// error hides another.
    #[error("{}", join_messages(.0))]
    Joined(Vec<Error>),
}

impl Error {
    /// Collapse collected errors into a single error. A single error is
    /// returned as itself, an empty list as `None`.
    pub fn join(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => Some(Error::Joined(errors)),
        }
    }

    /// Fold collected errors into a `Result`.
    pub fn joined_result(errors: Vec<Error>) -> Result<(), Error> {
        match Error::join(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn join_messages(errors: &[Error]) -> String {
    let parts: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} errors occurred: {}", errors.len(), parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_empty_is_none() {
        assert!(Error::join(Vec::new()).is_none());
    }

    #[test]
    fn test_join_single_error_is_unwrapped() {
        let joined = Error::join(vec![Error::ZeroTimestamp {
            metric: "cpu_usage".to_string(),
        }])
        .unwrap();
        assert!(matches!(joined, Error::ZeroTimestamp { .. }));
    }

    #[test]
    fn test_joined_display_enumerates_all_parts() {
        let joined = Error::join(vec![
            Error::ZeroTimestamp {
                metric: "cpu_usage".to_string(),
            },
            Error::AttributeCapacity {
                metric: "requests_total".to_string(),
            },
        ])
        .unwrap();

        let message = joined.to_string();
        assert!(message.starts_with("2 errors occurred"));
        assert!(message.contains("cpu_usage"));
        assert!(message.contains("requests_total"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = Error::TypeMismatch {
            expected: MetricType::Gauge,
            actual: MetricType::Sum,
        };
        assert_eq!(err.to_string(), "metric payload is not gauge (got sum)");
    }

    #[test]
    fn test_joined_result_ok_when_empty() {
        assert!(Error::joined_result(Vec::new()).is_ok());
    }
}
