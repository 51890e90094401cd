//! Error types for the Cassandra keyspace provider.

use thiserror::Error;

/// Errors surfaced to the host engine by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection settings are malformed. Raised before any connection attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Desired state failed a local check. No remote call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An administrative statement was rejected or failed at the database.
    #[error("Remote execution error: {0}")]
    RemoteExecution(String),

    /// A catalog read failed for a reason other than absence.
    #[error("Remote read error: {0}")]
    RemoteRead(String),

    /// The requested keyspace does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The operation cannot run in the provider's current state.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// An internal provider error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration(msg) => msg,
            Self::Validation(msg) => msg,
            Self::RemoteExecution(msg) => msg,
            Self::RemoteRead(msg) => msg,
            Self::NotFound(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::FailedPrecondition(msg) => msg,
            Self::Sdk(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("orders".to_string());
        assert_eq!(format!("{}", err), "Resource not found: orders");

        let err = ProviderError::Validation("bad class".to_string());
        assert_eq!(format!("{}", err), "Validation error: bad class");

        let err = ProviderError::RemoteExecution("syntax error".to_string());
        assert_eq!(format!("{}", err), "Remote execution error: syntax error");

        let err = ProviderError::RemoteRead("connection reset".to_string());
        assert_eq!(format!("{}", err), "Remote read error: connection reset");
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("invalid host_port".to_string());
        assert_eq!(err.message(), "invalid host_port");

        let err = ProviderError::FailedPrecondition("not configured".to_string());
        assert_eq!(err.message(), "not configured");

        let err: ProviderError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.message(), "serialization error (see Debug output)");
    }
}
