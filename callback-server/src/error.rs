//! Error types for the callback server.

/// Errors that can occur while starting or stopping the callback server.
#[derive(Debug, thiserror::Error)]
pub enum CallbackServerError {
    /// Every port in the requested range is taken
    #[error("No available port found in range {start}-{end}")]
    NoAvailablePort {
        /// First port tried
        start: u16,
        /// Last port tried
        end: u16,
    },

    /// The port range is empty or inverted
    #[error("Invalid port range: {start}-{end}")]
    InvalidPortRange {
        /// Range start
        start: u16,
        /// Range end
        end: u16,
    },

    /// The listener could not be bound
    #[error("Failed to bind port {port}: {reason}")]
    Bind {
        /// The port that failed
        port: u16,
        /// Underlying error
        reason: String,
    },

    /// The server task did not shut down cleanly
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Convenience type alias for Results using CallbackServerError.
pub type Result<T> = std::result::Result<T, CallbackServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CallbackServerError::NoAvailablePort { start: 8000, end: 8010 };
        assert_eq!(error.to_string(), "No available port found in range 8000-8010");

        let error = CallbackServerError::Bind {
            port: 80,
            reason: "permission denied".to_string(),
        };
        assert_eq!(error.to_string(), "Failed to bind port 80: permission denied");

        let error = CallbackServerError::InvalidPortRange { start: 9000, end: 8000 };
        assert_eq!(error.to_string(), "Invalid port range: 9000-8000");
    }
}
