//! Notification handling for HTTP callbacks.
//!
//! The server turns every `POST /notify` request into a [`NotificationPayload`]
//! and asks a [`NotificationHandler`] what to answer.

use async_trait::async_trait;
use bytes::Bytes;

/// Raw notification received over HTTP.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    /// Request path (always the notify path)
    pub path: String,
    /// Content-Type header, if the sender supplied one
    pub content_type: Option<String>,
    /// The unparsed request body
    pub body: Bytes,
}

/// Status and text the server answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
    /// HTTP status code
    pub status: u16,
    /// Plain-text response body
    pub body: String,
}

impl HandlerResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Decides the HTTP response for each incoming notification.
///
/// ```
/// use async_trait::async_trait;
/// use callback_server::{HandlerResponse, NotificationHandler, NotificationPayload};
///
/// struct Acknowledge;
///
/// #[async_trait]
/// impl NotificationHandler for Acknowledge {
///     async fn handle(&self, payload: NotificationPayload) -> HandlerResponse {
///         HandlerResponse::new(200, format!("{} bytes", payload.body.len()))
///     }
/// }
/// ```
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, payload: NotificationPayload) -> HandlerResponse;
}
