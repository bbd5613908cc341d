//! Error types for the leakprobe harness
//!
//! This module provides error handling using thiserror for structured error
//! definitions and anyhow for propagation at the binary edge.

use thiserror::Error;

use crate::client::ClientError;
use crate::config::ConfigError;

/// Main error type for leakprobe operations
#[derive(Error, Debug)]
pub enum LeakProbeError {
    /// Subject-under-test call failed in a way the scenario did not expect
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Collector background task is gone
    #[error("Collector stopped: {0}")]
    CollectorStopped(String),

    /// Scenario could not reach its release point
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// Unknown scenario name
    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for leakprobe operations
pub type Result<T> = std::result::Result<T, LeakProbeError>;

/// Convert anyhow::Error to LeakProbeError
impl From<anyhow::Error> for LeakProbeError {
    fn from(err: anyhow::Error) -> Self {
        LeakProbeError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LeakProbeError::ScenarioNotFound("watch-only".to_string());
        assert_eq!(err.to_string(), "Scenario not found: watch-only");
    }

    #[test]
    fn test_error_conversion() {
        let client_err = ClientError::UnknownSubscription("userDeleted".to_string());
        let err: LeakProbeError = client_err.into();
        assert!(matches!(err, LeakProbeError::Client(ClientError::UnknownSubscription(_))));

        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: LeakProbeError = json_err.into();
        assert!(matches!(err, LeakProbeError::Serialization(_)));
    }
}
