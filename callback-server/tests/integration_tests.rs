//! Integration tests for the callback server.
//!
//! These tests start a real HTTP server, send actual HTTP requests,
//! and verify end-to-end functionality.

use async_trait::async_trait;
use callback_server::{CallbackServer, HandlerResponse, NotificationHandler, NotificationPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Forwards every notification to a channel and acknowledges it.
struct ForwardingHandler {
    sender: mpsc::UnboundedSender<NotificationPayload>,
}

#[async_trait]
impl NotificationHandler for ForwardingHandler {
    async fn handle(&self, payload: NotificationPayload) -> HandlerResponse {
        let _ = self.sender.send(payload);
        HandlerResponse::new(200, "OK")
    }
}

/// Answers 400 for bodies that are not JSON objects, 200 otherwise.
struct ShapeCheckingHandler;

#[async_trait]
impl NotificationHandler for ShapeCheckingHandler {
    async fn handle(&self, payload: NotificationPayload) -> HandlerResponse {
        if payload.body.starts_with(b"{") {
            HandlerResponse::new(200, "accepted")
        } else {
            HandlerResponse::new(400, "Invalid JSON")
        }
    }
}

#[tokio::test]
async fn test_callback_server_end_to_end() {
    let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();

    let server = CallbackServer::new((50000, 50100), Arc::new(ForwardingHandler { sender: tx }))
        .await
        .expect("Failed to create callback server");

    // The detected address may not be routable from inside a sandbox
    let url = format!("http://127.0.0.1:{}/notify", server.port());
    let body = r#"{"id":"urn:ngsi-ld:Notification:1","notifiedAt":"2024-01-01T12:00:00Z","data":[]}"#;

    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .expect("Failed to send HTTP request");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");

    let notification = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("No notification received");

    assert_eq!(notification.path, "/notify");
    assert_eq!(notification.content_type.as_deref(), Some("application/json"));
    assert_eq!(&notification.body[..], body.as_bytes());

    server.shutdown().await.expect("Failed to shutdown server");
}

#[tokio::test]
async fn test_handler_status_is_forwarded() {
    let server = CallbackServer::new((50100, 50200), Arc::new(ShapeCheckingHandler))
        .await
        .expect("Failed to create callback server");
    let url = format!("http://127.0.0.1:{}/notify", server.port());
    let client = reqwest::Client::new();

    let ok = client.post(&url).body("{}").send().await.unwrap();
    assert_eq!(ok.status(), 200);
    assert_eq!(ok.text().await.unwrap(), "accepted");

    let bad = client.post(&url).body("not json").send().await.unwrap();
    assert_eq!(bad.status(), 400);
    assert_eq!(bad.text().await.unwrap(), "Invalid JSON");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    let server = CallbackServer::new((50200, 50300), Arc::new(ShapeCheckingHandler))
        .await
        .expect("Failed to create callback server");
    let base = format!("http://127.0.0.1:{}", server.port());
    let client = reqwest::Client::new();

    let not_found = client
        .post(format!("{base}/elsewhere"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(not_found.status(), 404);

    let wrong_method = client.get(format!("{base}/notify")).send().await.unwrap();
    assert_eq!(wrong_method.status(), 405);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_stops_accepting_after_shutdown() {
    let server = CallbackServer::new((50300, 50400), Arc::new(ShapeCheckingHandler))
        .await
        .expect("Failed to create callback server");
    let url = format!("http://127.0.0.1:{}/notify", server.port());

    server.shutdown().await.unwrap();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    assert!(client.post(&url).body("{}").send().await.is_err());
}
