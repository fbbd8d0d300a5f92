//! Error types for the Open Liberty operator

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The application spec is malformed or incomplete
    #[error("{0}")]
    ValidationError(String),

    /// A consumed service listed in status has no matching `spec.service.consumes` entry
    #[error("consumed service not declared: {0}")]
    ConsumesNotFound(String),

    /// Operator configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A Kubernetes quantity string could not be parsed
    #[error("quantities must match the regular expression '{pattern}', got '{value}'")]
    QuantityError { value: String, pattern: &'static str },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Create a validation error with the standard prefix
    pub fn validation(msg: impl std::fmt::Display) -> Self {
        Self::ValidationError(format!("validation failed: {msg}"))
    }

    /// Whether the reconcile should be retried quickly.
    ///
    /// Transient API failures are retriable; a bad spec or a missing
    /// binding will not fix itself until the user edits something.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(e)) => e.code >= 500 || e.code == 409 || e.code == 429,
            Error::KubeError(_) => true,
            _ => false,
        }
    }

    /// Short category label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::ValidationError(_) => "validation",
            Error::ConsumesNotFound(_) => "consumes",
            Error::ConfigError(_) => "config",
            Error::SerializationError(_) => "serialization",
            Error::QuantityError { .. } => "quantity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> Error {
        Error::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "InternalError".to_string(),
            code,
        }))
    }

    #[test]
    fn test_validation_error_has_prefix() {
        let err = Error::validation("must set the field(s): spec.storage.size");
        assert_eq!(
            err.to_string(),
            "validation failed: must set the field(s): spec.storage.size"
        );
        assert!(!err.is_retriable());
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_api_errors_retriable_by_code() {
        assert!(api_error(500).is_retriable());
        assert!(api_error(409).is_retriable());
        assert!(!api_error(403).is_retriable());
        assert!(!api_error(422).is_retriable());
    }

    #[test]
    fn test_consumes_not_found_is_not_retriable() {
        let err = Error::ConsumesNotFound("ns-db".to_string());
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("ns-db"));
    }
}
