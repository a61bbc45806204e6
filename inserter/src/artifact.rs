//! The inserter artifact.
//!
//! Payloads published by the linked peer are parsed, optionally transformed by a
//! data processor, queued, and then written to the broker one at a time: new
//! entities are created, existing ones have every attribute updated.

use std::future::Future;
use std::sync::Arc;

use artifact_bus::{ArtifactRuntime, BusError, Presence};
use ngsi_client::{AttributeUpdate, EntityGateway};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::config::{InserterConfig, InserterSettings};
use crate::error::Result;
use crate::template::build_entity_json;

/// Turns one parsed payload into the payloads to insert.
pub type DataProcessor = Arc<dyn Fn(Value) -> Vec<Value> + Send + Sync>;

/// What happened to one queued payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entity did not exist and was created
    Created { entity_id: String },
    /// The entity existed; `failed` attributes could not be written
    Updated {
        entity_id: String,
        updated: usize,
        failed: usize,
    },
    /// The broker refused the new entity
    CreateFailed { entity_id: String },
    /// The payload lacks `type` or `id`, or the built entity has no id
    Skipped,
}

/// Inserts or updates broker entities from a peer's publications.
pub struct InserterArtifact {
    runtime: Arc<dyn ArtifactRuntime>,
    config: InserterConfig,
    entities: EntityGateway,
    data_processor: Option<DataProcessor>,
    queue_tx: mpsc::UnboundedSender<Value>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl InserterArtifact {
    /// Create an inserter writing to `settings.broker_url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings or configuration are invalid.
    pub fn new(
        runtime: Arc<dyn ArtifactRuntime>,
        settings: InserterSettings,
        config: InserterConfig,
    ) -> Result<Self> {
        settings.validate()?;
        config.validate()?;

        let entities = match settings.request_timeout {
            Some(timeout) => EntityGateway::with_timeout(&settings.broker_url, timeout)?,
            None => EntityGateway::new(&settings.broker_url)?,
        };
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Ok(Self {
            runtime,
            config,
            entities,
            data_processor: None,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        })
    }

    /// Transform every parsed payload before it is queued.
    pub fn with_data_processor<F>(mut self, processor: F) -> Self
    where
        F: Fn(Value) -> Vec<Value> + Send + Sync + 'static,
    {
        self.data_processor = Some(Arc::new(processor));
        self
    }

    pub fn identity(&self) -> &str {
        self.runtime.identity()
    }

    pub fn config(&self) -> &InserterConfig {
        &self.config
    }

    /// Accept one publication. Returns the number of payloads queued.
    ///
    /// Invalid JSON is logged and dropped.
    pub fn artifact_callback(&self, publisher: &str, payload: &str) -> usize {
        let parsed: Value = match serde_json::from_str(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!("Invalid JSON from {publisher}: {e}");
                return 0;
            }
        };

        let payloads = match &self.data_processor {
            Some(processor) => processor(parsed),
            None => vec![parsed],
        };

        let mut queued = 0;
        for payload in payloads {
            if self.queue_tx.send(payload).is_ok() {
                queued += 1;
            }
        }
        tracing::debug!("Queued {queued} payload(s) from {publisher}");
        queued
    }

    /// Take the next queued payload without waiting. Only usable outside `run`,
    /// which holds the queue for its whole loop.
    #[cfg(test)]
    async fn try_next_payload(&self) -> Option<Value> {
        self.queue_rx.lock().await.try_recv().ok()
    }

    /// Build the entity for `payload` from the configured template.
    pub fn build_entity_json(&self, payload: &Value, clean: bool) -> Value {
        build_entity_json(
            &self.config.json_template,
            payload,
            &self.config.json_exceptions,
            clean,
        )
    }

    /// Write one payload to the broker.
    pub async fn process_and_send_data(&self, payload: &Value) -> InsertOutcome {
        let has_key = |key: &str| payload.get(key).is_some_and(|value| !value.is_null());
        if !has_key("type") || !has_key("id") {
            tracing::error!("Payload is missing 'type' or 'id', skipping: {payload}");
            return InsertOutcome::Skipped;
        }

        let entity = self.build_entity_json(payload, self.config.clean);
        let Some(entity_id) = entity.get("id").and_then(Value::as_str).map(str::to_string) else {
            tracing::error!("Built entity has no id, skipping: {entity}");
            return InsertOutcome::Skipped;
        };

        if !self.entities.entity_exists(&entity_id).await {
            return if self.entities.create_entity(&entity).await {
                InsertOutcome::Created { entity_id }
            } else {
                InsertOutcome::CreateFailed { entity_id }
            };
        }

        let context = entity.get("@context").cloned().unwrap_or(Value::Null);
        let results = self
            .entities
            .update_all_attributes(&entity_id, &entity, &context)
            .await;
        let failed = results
            .iter()
            .filter(|(_, update)| *update == AttributeUpdate::Failed)
            .count();
        if failed > 0 {
            tracing::warn!("{failed} attribute(s) of {entity_id} could not be written");
        }

        InsertOutcome::Updated {
            entity_id,
            updated: results.len() - failed,
            failed,
        }
    }

    /// Advertise availability. Failures are logged only.
    pub fn setup(&self) {
        if let Err(e) = self.runtime.set_presence(Presence::Available) {
            tracing::error!("Failed to set presence: {e}");
        }
    }

    /// Run until `shutdown` resolves, inserting everything the publisher sends.
    ///
    /// # Errors
    ///
    /// Fails when the messaging runtime cannot start or the publisher cannot be
    /// linked. Processing failures are logged and never end the loop.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        match self.runtime.start().await {
            Ok(()) | Err(BusError::AlreadyStarted(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.setup();

        let mut publications = self.runtime.link(&self.config.publisher).await?;
        tracing::info!("{} linked to {}", self.identity(), self.config.publisher);

        let mut queue = self.queue_rx.lock().await;
        let mut linked = true;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                publication = publications.recv(), if linked => match publication {
                    Ok(publication) => {
                        self.artifact_callback(&publication.publisher, &publication.payload);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dropped {skipped} publication(s) from {}", self.config.publisher);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("Publisher {} went away", self.config.publisher);
                        linked = false;
                    }
                },
                Some(payload) = queue.recv() => {
                    let outcome = self.process_and_send_data(&payload).await;
                    tracing::info!("Processed payload: {outcome:?}");
                }
            }
        }

        drop(queue);
        tracing::info!("Inserter {} stopping", self.identity());
        if let Err(e) = self.runtime.stop().await {
            tracing::error!("Error stopping messaging runtime: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_bus::InProcessBus;
    use serde_json::json;

    fn inserter() -> InserterArtifact {
        let bus = InProcessBus::new();
        let config = InserterConfig {
            publisher: "publisher@example.com".to_string(),
            ..Default::default()
        };
        InserterArtifact::new(
            Arc::new(bus.handle("test@example.com")),
            InserterSettings::new().with_broker_url("http://127.0.0.1:9"),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_json_is_not_queued() {
        let inserter = inserter();
        assert_eq!(inserter.artifact_callback("test_artifact", "{'invalid': json"), 0);
        assert!(inserter.try_next_payload().await.is_none());
    }

    #[tokio::test]
    async fn test_custom_processor() {
        let inserter = inserter().with_data_processor(|mut data| {
            data["processed"] = json!(true);
            vec![data.clone(), data]
        });

        let queued = inserter.artifact_callback("test_artifact", r#"{"type": "TestEntity", "id": "test1"}"#);
        assert_eq!(queued, 2);

        let first = inserter.try_next_payload().await.unwrap();
        assert_eq!(first["processed"], true);
        assert!(inserter.try_next_payload().await.is_some());
        assert!(inserter.try_next_payload().await.is_none());
    }

    #[tokio::test]
    async fn test_payload_without_type_is_skipped() {
        let inserter = inserter();
        let outcome = inserter
            .process_and_send_data(&json!({"id": "test1", "temperature": {"value": 25.0}}))
            .await;
        assert_eq!(outcome, InsertOutcome::Skipped);
    }

    #[test]
    fn test_publisher_is_required() {
        let bus = InProcessBus::new();
        let result = InserterArtifact::new(
            Arc::new(bus.handle("test@example.com")),
            InserterSettings::new(),
            InserterConfig::default(),
        );
        assert!(result.is_err());
    }
}
