//! Error types for broker communication.

use thiserror::Error;

/// Errors raised while talking to the context broker.
#[derive(Debug, Error)]
pub enum NgsiError {
    /// The configured broker URL cannot be used as a base URL
    #[error("Invalid broker URL '{url}': {reason}")]
    InvalidBrokerUrl { url: String, reason: String },

    /// Connection, timeout or protocol failure before a status was received
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The broker answered with a status other than the expected one
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A 201 response carried no usable `Location` header
    #[error("Missing Location header in creation response")]
    MissingLocation,

    /// The response body could not be decoded
    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    /// A request body could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NgsiError {
    /// Status code carried by the error, if the broker answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            NgsiError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Type alias for results that can return an NgsiError
pub type Result<T> = std::result::Result<T, NgsiError>;
