//! Error types for the subscription manager.

use artifact_bus::BusError;
use callback_server::CallbackServerError;
use ngsi_client::NgsiError;
use thiserror::Error;

/// Errors that stop the subscription manager.
///
/// Broker failures during reconciliation are not errors: they are logged and
/// degrade. Only configuration problems and local startup failures end up here.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Configuration is missing or inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The notification listener could not start
    #[error("Notification listener error: {0}")]
    Listener(#[from] CallbackServerError),

    /// The broker gateway could not be built
    #[error("Broker error: {0}")]
    Broker(#[from] NgsiError),

    /// The messaging runtime refused to start
    #[error("Messaging error: {0}")]
    Messaging(#[from] BusError),
}

/// Type alias for results that can return a ManagerError
pub type Result<T> = std::result::Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ManagerError::Configuration("entity_type is required".to_string());
        assert_eq!(error.to_string(), "Configuration error: entity_type is required");

        let error: ManagerError = CallbackServerError::NoAvailablePort { start: 1, end: 2 }.into();
        assert_eq!(
            error.to_string(),
            "Notification listener error: No available port found in range 1-2"
        );
    }
}
