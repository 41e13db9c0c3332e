use std::time::Duration;
use thiserror::Error;

/// Engine error types
#[derive(Error, Debug)]
pub enum PercolateError {
    /// Malformed or schema-inconsistent input document
    #[error("Parse error: {0}")]
    Parse(String),

    /// Memory ceiling or evaluation queue backlog exceeded
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Percolation call exceeded its configured timeout
    #[error("Percolation timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PercolateError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            PercolateError::Parse(_) => "PARSE_ERROR",
            PercolateError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            PercolateError::Timeout(_) => "TIMEOUT",
            PercolateError::Configuration(_) => "CONFIGURATION_ERROR",
            PercolateError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the condition is caller backpressure rather than a fault
    pub fn is_backpressure(&self) -> bool {
        matches!(
            self,
            PercolateError::ResourceExhausted(_) | PercolateError::Timeout(_)
        )
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for PercolateError {
    fn from(err: serde_json::Error) -> Self {
        PercolateError::Parse(err.to_string())
    }
}

/// Conversion from tantivy::TantivyError
impl From<tantivy::TantivyError> for PercolateError {
    fn from(err: tantivy::TantivyError) -> Self {
        PercolateError::Internal(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for PercolateError {
    fn from(err: config::ConfigError) -> Self {
        PercolateError::Configuration(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for PercolateError {
    fn from(err: validator::ValidationErrors) -> Self {
        PercolateError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PercolateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PercolateError::Parse("bad".to_string()).error_code(),
            "PARSE_ERROR"
        );
        assert_eq!(
            PercolateError::ResourceExhausted("full".to_string()).error_code(),
            "RESOURCE_EXHAUSTED"
        );
        assert_eq!(
            PercolateError::Timeout(Duration::from_millis(5)).error_code(),
            "TIMEOUT"
        );
    }

    #[test]
    fn test_backpressure_classification() {
        assert!(PercolateError::ResourceExhausted("full".to_string()).is_backpressure());
        assert!(PercolateError::Timeout(Duration::from_secs(1)).is_backpressure());
        assert!(!PercolateError::Parse("bad".to_string()).is_backpressure());
        assert!(!PercolateError::Internal("bug".to_string()).is_backpressure());
    }

    #[test]
    fn test_json_error_becomes_parse() {
        let err = serde_json::from_slice::<serde_json::Value>(b"{not json").unwrap_err();
        let err: PercolateError = err.into();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }
}
