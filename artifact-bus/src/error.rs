//! Error types for the artifact bus.

/// Errors raised by an [`ArtifactRuntime`](crate::ArtifactRuntime) implementation.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The artifact was used before `start` or after `stop`
    #[error("Artifact not started: {0}")]
    NotStarted(String),

    /// The artifact was started twice
    #[error("Artifact already started: {0}")]
    AlreadyStarted(String),

    /// A publication could not be delivered
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Linking to a peer failed
    #[error("Link to {peer} failed: {reason}")]
    LinkFailed {
        /// The peer identity
        peer: String,
        /// Why the link failed
        reason: String,
    },

    /// Presence could not be changed
    #[error("Presence error: {0}")]
    Presence(String),
}

/// Convenience type alias for Results using BusError.
pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_error_display() {
        let error = BusError::NotStarted("artifact@localhost".to_string());
        assert_eq!(error.to_string(), "Artifact not started: artifact@localhost");

        let error = BusError::LinkFailed {
            peer: "peer@localhost".to_string(),
            reason: "unknown peer".to_string(),
        };
        assert_eq!(error.to_string(), "Link to peer@localhost failed: unknown peer");

        let error = BusError::PublishFailed("closed".to_string());
        assert_eq!(error.to_string(), "Publish failed: closed");
    }
}
