//! Error types for the inserter.

use artifact_bus::BusError;
use ngsi_client::NgsiError;
use thiserror::Error;

/// Errors that prevent the inserter from running.
#[derive(Debug, Error)]
pub enum InserterError {
    /// Configuration is missing or inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The entity gateway could not be built
    #[error("Broker error: {0}")]
    Broker(#[from] NgsiError),

    /// Starting the runtime or linking to the publisher failed
    #[error("Messaging error: {0}")]
    Messaging(#[from] BusError),
}

/// Type alias for results that can return an InserterError
pub type Result<T> = std::result::Result<T, InserterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = InserterError::Configuration("publisher is required".to_string());
        assert_eq!(error.to_string(), "Configuration error: publisher is required");

        let error: InserterError = BusError::NotStarted("inserter@localhost".to_string()).into();
        assert!(error.to_string().starts_with("Messaging error: "));
    }
}
