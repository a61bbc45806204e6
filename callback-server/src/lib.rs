//! HTTP callback server for receiving context broker notifications.
//!
//! This crate provides a lightweight HTTP server exposing a single `POST /notify`
//! endpoint. It is generic: it knows nothing about NGSI-LD documents and hands
//! every request body to a [`NotificationHandler`], whose [`HandlerResponse`]
//! becomes the HTTP response.
//!
//! # Overview
//!
//! - [`CallbackServer`]: binds to a free port in a range on all interfaces, detects
//!   the local address that peers can reach, and serves the notify endpoint.
//! - [`NotificationHandler`]: trait implemented by the consuming crate.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use callback_server::{CallbackServer, HandlerResponse, NotificationHandler, NotificationPayload};
//! use tokio::sync::mpsc;
//!
//! struct Forward(mpsc::UnboundedSender<NotificationPayload>);
//!
//! #[async_trait]
//! impl NotificationHandler for Forward {
//!     async fn handle(&self, payload: NotificationPayload) -> HandlerResponse {
//!         let _ = self.0.send(payload);
//!         HandlerResponse::new(200, "OK")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::CallbackServerError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let server = CallbackServer::new((8000, 65000), Arc::new(Forward(tx))).await?;
//!
//!     println!("Notifications go to {}", server.notify_url());
//!
//!     while let Some(notification) = rx.recv().await {
//!         println!("Received {} bytes", notification.body.len());
//!     }
//!
//!     server.shutdown().await
//! }
//! ```

pub mod error;
pub mod handler;
pub mod server;

pub use error::{CallbackServerError, Result};
pub use handler::{HandlerResponse, NotificationHandler, NotificationPayload};
pub use server::{CallbackServer, DEFAULT_PORT_RANGE, NOTIFY_PATH};
