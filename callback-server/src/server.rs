//! HTTP server for receiving context broker notifications.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use warp::Filter;

use crate::error::{CallbackServerError, Result};
use crate::handler::{NotificationHandler, NotificationPayload};

/// Port range searched when the caller has no preference.
pub const DEFAULT_PORT_RANGE: (u16, u16) = (8000, 65000);

/// Path segment of the notification endpoint.
pub const NOTIFY_PATH: &str = "notify";

/// Address used to pick the outbound interface. Nothing is sent to it.
const ROUTING_PROBE_ADDR: &str = "10.255.255.255:1";

/// HTTP callback server for receiving broker notifications.
///
/// The `CallbackServer` binds to a local port on all interfaces and exposes
/// `POST /notify`. Every request body goes to the configured
/// [`NotificationHandler`], whose answer is sent back verbatim.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use callback_server::{CallbackServer, HandlerResponse, NotificationHandler, NotificationPayload};
///
/// struct Log;
///
/// #[async_trait]
/// impl NotificationHandler for Log {
///     async fn handle(&self, payload: NotificationPayload) -> HandlerResponse {
///         println!("Received {} bytes", payload.body.len());
///         HandlerResponse::new(200, "OK")
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> callback_server::Result<()> {
///     let server = CallbackServer::new((8000, 8100), Arc::new(Log)).await?;
///     println!("Server listening at: {}", server.base_url());
///
///     tokio::signal::ctrl_c().await.ok();
///     server.shutdown().await
/// }
/// ```
pub struct CallbackServer {
    /// The port the server is bound to
    port: u16,
    /// Address peers should use to reach this host
    local_ip: IpAddr,
    /// The base URL for callback registration
    base_url: String,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Create and start a callback server on the first free port in `port_range`.
    ///
    /// The server:
    /// - Finds an available port in the specified range
    /// - Detects the local IP address for callback URLs
    /// - Starts serving `POST /notify` through `handler`
    ///
    /// # Errors
    ///
    /// Returns an error if the range is invalid, no port is free, or the listener
    /// cannot be bound.
    pub async fn new(
        port_range: (u16, u16),
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<Self> {
        let (start, end) = port_range;
        if start > end {
            return Err(CallbackServerError::InvalidPortRange { start, end });
        }

        let port = Self::find_available_port(start, end)
            .ok_or(CallbackServerError::NoAvailablePort { start, end })?;

        Self::bind(port, handler).await
    }

    /// Create and start a callback server on exactly `port`.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackServerError::Bind`] if the port cannot be bound, for
    /// example because it is privileged or already in use.
    pub async fn bind(port: u16, handler: Arc<dyn NotificationHandler>) -> Result<Self> {
        let local_ip = Self::detect_local_ip();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let notify_route = warp::path(NOTIFY_PATH)
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::path::full())
            .and(warp::header::optional::<String>("content-type"))
            .and(warp::body::bytes())
            .and_then(
                move |path: warp::path::FullPath, content_type: Option<String>, body: Bytes| {
                    let handler = handler.clone();
                    async move {
                        tracing::debug!(
                            "Incoming notification on {} ({} bytes)",
                            path.as_str(),
                            body.len()
                        );

                        let payload = NotificationPayload {
                            path: path.as_str().to_string(),
                            content_type,
                            body,
                        };
                        let response = handler.handle(payload).await;

                        let status = warp::http::StatusCode::from_u16(response.status)
                            .unwrap_or(warp::http::StatusCode::INTERNAL_SERVER_ERROR);
                        Ok::<_, warp::Rejection>(warp::reply::with_status(response.body, status))
                    }
                },
            );

        let routes = notify_route.recover(handle_rejection);

        let (addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                async move {
                    shutdown_rx.recv().await;
                },
            )
            .map_err(|e| CallbackServerError::Bind {
                port,
                reason: e.to_string(),
            })?;

        let port = addr.port();
        let base_url = format!("http://{local_ip}:{port}");
        let server_handle = tokio::spawn(server);

        tracing::info!("Notification server listening on {addr} (reachable at {base_url})");

        Ok(Self {
            port,
            local_ip,
            base_url,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Base URL, `http://<local_ip>:<port>`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the notify endpoint, the value to register with the broker.
    pub fn notify_url(&self) -> String {
        format!("{}/{}", self.base_url, NOTIFY_PATH)
    }

    /// The port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The detected local address.
    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    /// Shutdown the callback server gracefully.
    ///
    /// Sends the shutdown signal and waits for in-flight requests to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| CallbackServerError::Shutdown(e.to_string()))?;
        }

        tracing::info!("Notification server on port {} stopped", self.port);
        Ok(())
    }

    /// Find an available port in the given range.
    pub fn find_available_port(start: u16, end: u16) -> Option<u16> {
        (start..=end).find(|&port| Self::is_port_available(port))
    }

    /// Check if a port is available for binding.
    fn is_port_available(port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).is_ok()
    }

    /// Detect the local IP address for callback URLs.
    ///
    /// Connecting a UDP socket selects the outbound interface without sending
    /// anything. Falls back to loopback when no route exists.
    pub fn detect_local_ip() -> IpAddr {
        let outbound_ip = || -> Option<IpAddr> {
            let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
            socket.connect(ROUTING_PROBE_ADDR).ok()?;
            Some(socket.local_addr().ok()?.ip())
        };

        match outbound_ip() {
            Some(ip) if !ip.is_unspecified() => ip,
            _ => {
                tracing::warn!("Could not detect local IP address, falling back to 127.0.0.1");
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            }
        }
    }
}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(
    err: warp::Rejection,
) -> std::result::Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.is_not_found() {
        (warp::http::StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (warp::http::StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        (
            warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        )
    };

    Ok(warp::reply::with_status(message, code))
}
