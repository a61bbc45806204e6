//! Routing of broker notifications to the messaging runtime.

use std::collections::HashMap;
use std::sync::Arc;

use artifact_bus::ArtifactRuntime;
use async_trait::async_trait;
use callback_server::{HandlerResponse, NotificationHandler, NotificationPayload};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

/// Body answered for a processed notification.
pub const ACKNOWLEDGEMENT: &str = "Notification received and processed";

/// Keys kept in every entity whatever the watched attributes.
const ALWAYS_KEPT: [&str; 2] = ["id", "type"];

/// How a notification was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Filtered and republished
    Processed,
    /// The body is not JSON
    Malformed,
    /// The body lacks entity data, or republishing failed
    Failed,
}

impl NotificationOutcome {
    pub fn status(self) -> u16 {
        match self {
            NotificationOutcome::Processed => 200,
            NotificationOutcome::Malformed => 400,
            NotificationOutcome::Failed => 500,
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            NotificationOutcome::Processed => ACKNOWLEDGEMENT,
            NotificationOutcome::Malformed => "Invalid JSON",
            NotificationOutcome::Failed => "Internal Server Error",
        }
    }
}

/// Last notification seen for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    /// `notifiedAt` exactly as the broker sent it
    pub notified_at: String,
    /// When this process received it
    pub received_at: DateTime<Utc>,
}

/// Filters notifications down to the watched attributes and republishes them.
pub struct NotificationRouter {
    runtime: Arc<dyn ArtifactRuntime>,
    watched: Vec<String>,
    records: RwLock<HashMap<String, NotificationRecord>>,
}

impl NotificationRouter {
    /// Route notifications through `runtime`, keeping only `watched` attributes
    /// (all attributes when empty).
    pub fn new(runtime: Arc<dyn ArtifactRuntime>, watched: Vec<String>) -> Self {
        Self {
            runtime,
            watched,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn watched_attributes(&self) -> &[String] {
        &self.watched
    }

    /// Snapshot of the latest notification per entity.
    pub async fn recent_notifications(&self) -> HashMap<String, NotificationRecord> {
        self.records.read().await.clone()
    }

    pub async fn last_notified(&self, entity_id: &str) -> Option<NotificationRecord> {
        self.records.read().await.get(entity_id).cloned()
    }

    /// Handle one raw notification body.
    pub async fn handle_notification(&self, raw_body: &[u8]) -> NotificationOutcome {
        let mut notification: Value = match serde_json::from_slice(raw_body) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::error!("Failed to decode notification JSON: {e}");
                return NotificationOutcome::Malformed;
            }
        };

        let watched = self.watched_attributes();
        let Some(entities) = notification
            .get_mut("data")
            .and_then(Value::as_array_mut)
            .filter(|entities| !entities.is_empty())
        else {
            tracing::error!("Notification has no entity data");
            return NotificationOutcome::Failed;
        };
        if let Some(entity) = entities.iter().find(|entity| !entity.is_object()) {
            tracing::error!("Notification entity is not an object: {entity}");
            return NotificationOutcome::Failed;
        }

        if !watched.is_empty() {
            for entity in entities.iter_mut() {
                if let Value::Object(attributes) = entity {
                    attributes.retain(|key, _| {
                        ALWAYS_KEPT.contains(&key.as_str()) || watched.contains(key)
                    });
                }
            }
        }

        let entity_ids: Vec<String> = entities
            .iter()
            .filter_map(|entity| entity.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        if let Some(notified_at) = notification.get("notifiedAt").and_then(Value::as_str) {
            let received_at = Utc::now();
            let mut records = self.records.write().await;
            for entity_id in &entity_ids {
                records.insert(
                    entity_id.clone(),
                    NotificationRecord {
                        notified_at: notified_at.to_string(),
                        received_at,
                    },
                );
            }
        }

        tracing::info!("Received notification for {}", entity_ids.join(", "));

        let payload = match serde_json::to_string(&notification) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to encode filtered notification: {e}");
                return NotificationOutcome::Failed;
            }
        };
        tracing::debug!("Filtered notification: {payload}");

        if let Err(e) = self.runtime.publish(payload).await {
            tracing::error!("Failed to publish notification: {e}");
            return NotificationOutcome::Failed;
        }

        NotificationOutcome::Processed
    }
}

#[async_trait]
impl NotificationHandler for NotificationRouter {
    async fn handle(&self, payload: NotificationPayload) -> HandlerResponse {
        let outcome = self.handle_notification(&payload.body).await;
        HandlerResponse::new(outcome.status(), outcome.body())
    }
}
