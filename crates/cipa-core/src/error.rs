//! Error types for fleet audit operations.
//!
//! Per-metric and per-server failures are absorbed into the report model by the collector, so
//! most of these variants never reach the operator. Only configuration, discovery and identity
//! mismatch errors are meant to halt work.

use thiserror::Error;

/// Main error type for fleet audit operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Server discovery failed
    #[error("Server discovery failed: {0}")]
    DiscoveryFailed(String),

    /// The directory server could not be reached
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The directory server rejected the bind
    #[error("Bind failed: {0}")]
    BindFailed(String),

    /// The server does not identify itself as the expected fleet member
    #[error("Identity mismatch: expected {expected}, server reports {actual}")]
    IdentityMismatch {
        /// Value derived from the configured host and domain
        expected: String,
        /// Value reported by the server
        actual: String,
    },

    /// The searched object does not exist on the server
    #[error("No such object: {0}")]
    NoSuchObject(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// An attribute value could not be interpreted
    #[error("Malformed attribute {attribute}: {value:?}")]
    MalformedAttribute {
        /// Attribute name
        attribute: String,
        /// Raw value returned by the server
        value: String,
    },

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// External service error
    #[error("External service error: {service}: {message}")]
    ExternalServiceError {
        /// Service name that failed
        service: String,
        /// Error message
        message: String,
    },
}

/// Specialized result type for fleet audit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::DiscoveryFailed(_) => "DISCOVERY_FAILED",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::BindFailed(_) => "BIND_FAILED",
            Self::IdentityMismatch { .. } => "IDENTITY_MISMATCH",
            Self::NoSuchObject(_) => "NO_SUCH_OBJECT",
            Self::Timeout(_) => "TIMEOUT",
            Self::MalformedAttribute { .. } => "MALFORMED_ATTRIBUTE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
        }
    }

    /// Returns true if the failure points at a misconfigured or foreign server rather than a
    /// transient outage, and is logged at `error` instead of `warn`.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::IdentityMismatch { .. }
                | Self::ExternalServiceError { .. }
        )
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::DiscoveryFailed("test".to_string()).error_code(),
            "DISCOVERY_FAILED"
        );
        assert_eq!(
            Error::BindFailed("test".to_string()).error_code(),
            "BIND_FAILED"
        );
        assert_eq!(
            Error::IdentityMismatch {
                expected: "a".to_string(),
                actual: "b".to_string()
            }
            .error_code(),
            "IDENTITY_MISMATCH"
        );
        assert_eq!(
            Error::NoSuchObject("test".to_string()).error_code(),
            "NO_SUCH_OBJECT"
        );
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
    }

    #[test]
    fn test_error_display() {
        let err = Error::IdentityMismatch {
            expected: "dc=example,dc=com".to_string(),
            actual: "dc=other,dc=org".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Identity mismatch: expected dc=example,dc=com, server reports dc=other,dc=org"
        );

        let err = Error::ExternalServiceError {
            service: "ldap".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "External service error: ldap: connection reset"
        );
    }

    #[test]
    fn test_should_log() {
        assert!(Error::ConfigError("no domain".to_string()).should_log());
        assert!(Error::IdentityMismatch {
            expected: "a".to_string(),
            actual: "b".to_string()
        }
        .should_log());
        assert!(!Error::BindFailed("invalid credentials".to_string()).should_log());
        assert!(!Error::Timeout("search".to_string()).should_log());
    }
}
