//! Error types for the forecast-lab toolkit.

use thiserror::Error;

/// Result type alias for toolkit operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while building features, splitting, fitting or evaluating.
///
/// Skipped folds and infinite metric values are not errors; they are
/// reported through the normal return values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Invalid or inconsistent configuration: unknown statistic, missing
    /// column, non-positive window or lag, impossible CV recipe.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed input data: duplicate or unordered timestamps, missing
    /// reference points, unparsable values.
    #[error("data error: {0}")]
    Data(String),

    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Model has not been fitted yet.
    #[error("model must be fitted before prediction")]
    FitRequired,

    /// Numerical failure inside a model.
    #[error("computation error: {0}")]
    ComputationError(String),

    /// Filesystem failure while loading data or writing runs and reports.
    #[error("io error: {0}")]
    Io(String),
}

impl ForecastError {
    /// Configuration error for a column that is not present in a frame.
    pub fn missing_column(name: &str) -> Self {
        Self::Configuration(format!("missing column '{name}'"))
    }

    /// Whether this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Whether this is a data error.
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }
}

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            Self::Io(err.to_string())
        } else {
            Self::Data(format!("csv: {err}"))
        }
    }
}

impl From<serde_yaml::Error> for ForecastError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration(format!("yaml: {err}"))
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Data(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::EmptyData;
        assert_eq!(err.to_string(), "empty input data");

        let err = ForecastError::InsufficientData { needed: 10, got: 5 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 10, got 5"
        );

        let err = ForecastError::missing_column("y");
        assert_eq!(err.to_string(), "configuration error: missing column 'y'");

        let err = ForecastError::Data("duplicate timestamp".to_string());
        assert_eq!(err.to_string(), "data error: duplicate timestamp");

        let err = ForecastError::FitRequired;
        assert_eq!(err.to_string(), "model must be fitted before prediction");
    }

    #[test]
    fn classification_helpers() {
        assert!(ForecastError::missing_column("x").is_configuration());
        assert!(!ForecastError::missing_column("x").is_data());
        assert!(ForecastError::Data("bad".into()).is_data());
        assert!(!ForecastError::EmptyData.is_configuration());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ForecastError = io.into();
        assert!(matches!(err, ForecastError::Io(msg) if msg.contains("gone")));
    }

    #[test]
    fn yaml_errors_are_configuration_errors() {
        let parsed: std::result::Result<Vec<u32>, _> = serde_yaml::from_str("[1, -2]");
        let err: ForecastError = parsed.unwrap_err().into();
        assert!(err.is_configuration());
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = ForecastError::EmptyData;
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
