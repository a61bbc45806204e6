//! Entity operations against `{broker}/ngsi-ld/v1/entities`.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};

use crate::error::{NgsiError, Result};
use crate::http::{expect_status, BrokerEndpoint, LD_JSON};

const ENTITIES_PATH: &str = "entities";

/// Top-level entity keys that are not attributes.
const RESERVED_KEYS: [&str; 3] = ["id", "type", "@context"];

/// Outcome of pushing one attribute to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeUpdate {
    /// The attribute existed and was patched
    Updated,
    /// The attribute was missing and has been appended
    Created,
    /// Neither the patch nor the append succeeded
    Failed,
}

impl AttributeUpdate {
    pub fn is_success(self) -> bool {
        !matches!(self, AttributeUpdate::Failed)
    }
}

/// HTTP gateway for NGSI-LD entities.
#[derive(Debug, Clone)]
pub struct EntityGateway {
    endpoint: BrokerEndpoint,
}

impl EntityGateway {
    pub fn new(broker_url: &str) -> Result<Self> {
        Self::with_client(broker_url, Client::new())
    }

    pub fn with_timeout(broker_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: BrokerEndpoint::with_timeout(broker_url, timeout)?,
        })
    }

    pub fn with_client(broker_url: &str, client: Client) -> Result<Self> {
        Ok(Self {
            endpoint: BrokerEndpoint::new(broker_url, client)?,
        })
    }

    pub fn broker_url(&self) -> &str {
        self.endpoint.base()
    }

    fn entity_url(&self, entity_id: &str) -> String {
        self.endpoint.url(&format!("{ENTITIES_PATH}/{entity_id}"))
    }

    fn attrs_url(&self, entity_id: &str) -> String {
        self.endpoint
            .url(&format!("{ENTITIES_PATH}/{entity_id}/attrs"))
    }

    /// Whether the broker knows `entity_id`. Any failure counts as "no".
    pub async fn entity_exists(&self, entity_id: &str) -> bool {
        match self.try_entity_exists(entity_id).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::error!("Error checking entity {entity_id}: {e}");
                false
            }
        }
    }

    /// `Ok(true)` on 200, `Ok(false)` on any other status.
    pub async fn try_entity_exists(&self, entity_id: &str) -> Result<bool> {
        let response = self
            .endpoint
            .client()
            .get(self.entity_url(entity_id))
            .header(ACCEPT, LD_JSON)
            .send()
            .await?;
        Ok(response.status() == StatusCode::OK)
    }

    /// Create `entity`. True on `201 Created`.
    pub async fn create_entity(&self, entity: &Value) -> bool {
        let entity_id = entity.get("id").and_then(Value::as_str).unwrap_or("<no id>");
        match self.try_create_entity(entity).await {
            Ok(()) => {
                tracing::info!("Entity {entity_id} created");
                true
            }
            Err(e) => {
                tracing::error!("Failed to create entity {entity_id}: {e}");
                false
            }
        }
    }

    pub async fn try_create_entity(&self, entity: &Value) -> Result<()> {
        let body = serde_json::to_string(entity)?;
        let response = self
            .endpoint
            .client()
            .post(self.endpoint.url(ENTITIES_PATH))
            .header(CONTENT_TYPE, LD_JSON)
            .body(body)
            .send()
            .await?;
        expect_status(response, &[201]).await?;
        Ok(())
    }

    /// Patch one attribute, appending it when the broker reports it missing.
    ///
    /// A `207 Multi-Status` answer to the patch means the attribute does not
    /// exist yet, so it is posted to `/{id}/attrs` instead.
    pub async fn update_attribute(
        &self,
        entity_id: &str,
        name: &str,
        data: &Value,
        context: &Value,
    ) -> AttributeUpdate {
        let outcome = self.try_update_attribute(entity_id, name, data, context).await;
        match outcome {
            Ok(update) => {
                tracing::debug!("Attribute {name} of {entity_id}: {update:?}");
                update
            }
            Err(e) => {
                tracing::error!("Failed to update attribute {name} of {entity_id}: {e}");
                AttributeUpdate::Failed
            }
        }
    }

    pub async fn try_update_attribute(
        &self,
        entity_id: &str,
        name: &str,
        data: &Value,
        context: &Value,
    ) -> Result<AttributeUpdate> {
        let mut fragment = attribute_fragment(data);
        if let Value::Object(map) = &mut fragment {
            map.insert("@context".to_string(), context.clone());
        }

        let response = self
            .endpoint
            .client()
            .patch(format!("{}/{name}", self.attrs_url(entity_id)))
            .header(CONTENT_TYPE, LD_JSON)
            .body(serde_json::to_string(&fragment)?)
            .send()
            .await?;

        match response.status().as_u16() {
            204 => Ok(AttributeUpdate::Updated),
            207 => {
                tracing::debug!("Attribute {name} missing on {entity_id}, appending it");
                self.try_append_attribute(entity_id, name, data, context)
                    .await
                    .map(|()| AttributeUpdate::Created)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(NgsiError::UnexpectedStatus { status, body })
            }
        }
    }

    async fn try_append_attribute(
        &self,
        entity_id: &str,
        name: &str,
        data: &Value,
        context: &Value,
    ) -> Result<()> {
        let mut body = Map::new();
        body.insert(name.to_string(), attribute_fragment(data));
        body.insert("@context".to_string(), context.clone());

        let response = self
            .endpoint
            .client()
            .post(self.attrs_url(entity_id))
            .header(CONTENT_TYPE, LD_JSON)
            .body(serde_json::to_string(&body)?)
            .send()
            .await?;
        expect_status(response, &[201, 204]).await?;
        Ok(())
    }

    /// Push every attribute of `entity` (all keys except `id`, `type` and
    /// `@context`), in document order.
    pub async fn update_all_attributes(
        &self,
        entity_id: &str,
        entity: &Value,
        context: &Value,
    ) -> Vec<(String, AttributeUpdate)> {
        let Some(attributes) = entity.as_object() else {
            tracing::warn!("Entity {entity_id} is not a JSON object, nothing to update");
            return Vec::new();
        };

        let mut results = Vec::with_capacity(attributes.len());
        for (name, data) in attributes {
            if RESERVED_KEYS.contains(&name.as_str()) {
                continue;
            }
            let update = self.update_attribute(entity_id, name, data, context).await;
            results.push((name.clone(), update));
        }
        results
    }
}

/// Build the NGSI-LD attribute fragment for `data`.
///
/// - objects with `coordinates` become a `GeoProperty` holding a `Point`
/// - objects with `object` become a `Relationship`
/// - other objects become a `Property`, keeping their members (`value`,
///   `unitCode`, `observedAt`, ...)
/// - scalars and arrays are wrapped as the `value` of a `Property`
pub fn attribute_fragment(data: &Value) -> Value {
    match data {
        Value::Object(map) if map.contains_key("coordinates") => json!({
            "type": "GeoProperty",
            "value": {
                "type": "Point",
                "coordinates": map["coordinates"].clone(),
            }
        }),
        Value::Object(map) if map.contains_key("object") => json!({
            "type": "Relationship",
            "object": map["object"].clone(),
        }),
        Value::Object(map) if map.contains_key("value") => {
            let mut fragment = map.clone();
            fragment
                .entry("type")
                .or_insert_with(|| Value::String("Property".to_string()));
            Value::Object(fragment)
        }
        other => json!({
            "type": "Property",
            "value": other.clone(),
        }),
    }
}
