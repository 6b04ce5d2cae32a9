//! Error types for the forecasting pipeline.

use thiserror::Error;

/// Result type alias for forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors raised while scaling, training, storing or predicting a metric.
///
/// Pipelines treat every variant as terminal for the metric it was raised
/// for and carry on with the remaining metrics.
#[derive(Error, Debug)]
pub enum ForecastError {
    /// The reference series is constant, so the scale range would be zero.
    #[error("degenerate range: every value equals {value}")]
    DegenerateRange { value: f64 },

    /// Not enough values (or windows) for the requested operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// No complete trained artifact is stored for the metric.
    #[error("no trained artifact for metric '{metric}'")]
    ArtifactNotFound { metric: String },

    /// The series contains values the pipeline cannot work with.
    #[error("invalid series: {0}")]
    InvalidSeries(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A metric name that cannot be used as a store key.
    #[error("invalid metric name: '{0}'")]
    InvalidMetricName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ForecastError {
    pub(crate) fn artifact_not_found(metric: &str) -> Self {
        ForecastError::ArtifactNotFound {
            metric: metric.to_string(),
        }
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(error: serde_json::Error) -> Self {
        ForecastError::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for ForecastError {
    fn from(error: bincode::Error) -> Self {
        ForecastError::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::InsufficientData { needed: 16, got: 3 };
        assert_eq!(err.to_string(), "insufficient data: need at least 16, got 3");

        let err = ForecastError::DegenerateRange { value: 2.0 };
        assert_eq!(err.to_string(), "degenerate range: every value equals 2");

        let err = ForecastError::artifact_not_found("downtime");
        assert_eq!(err.to_string(), "no trained artifact for metric 'downtime'");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ForecastError = io.into();
        assert!(matches!(err, ForecastError::Io(_)));
    }
}
