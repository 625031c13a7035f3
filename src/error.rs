use thiserror::Error;

/// Custom error types for the session relay
#[derive(Debug, Error)]
pub enum SessionError {
    /// Wire errors
    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Report errors
    #[error("Report artifact I/O failed: {0}")]
    ReportArtifact(#[from] std::io::Error),

    #[error("Report delivery failed: {0}")]
    ReportDeliveryFailed(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigurationParseFailed(String),

    /// Network errors
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Generic errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        SessionError::Internal(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        SessionError::ReportDeliveryFailed(msg.into())
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::NetworkError(err.to_string())
    }
}
