//! Subscription CRUD against `{broker}/ngsi-ld/v1/subscriptions`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::Client;
use serde_json::Value;

use crate::error::{NgsiError, Result};
use crate::http::{expect_status, BrokerEndpoint, LD_JSON, MERGE_PATCH_JSON};
use crate::subscription::{BrokerSubscription, SubscriptionDocument, SubscriptionPatch};

const SUBSCRIPTIONS_PATH: &str = "subscriptions";

/// Subscription operations the reconciler needs from a broker.
///
/// Every method degrades instead of failing: a broker that cannot be reached
/// looks like a broker with nothing on it.
#[async_trait]
pub trait SubscriptionBroker: Send + Sync {
    /// Create a subscription and return the broker-assigned id.
    async fn create(&self, document: &SubscriptionDocument) -> Option<String>;

    /// List every subscription the broker holds.
    async fn list(&self) -> Vec<BrokerSubscription>;

    /// Merge-patch an existing subscription.
    async fn update(&self, broker_id: &str, patch: &SubscriptionPatch) -> bool;

    /// Delete a subscription.
    async fn delete(&self, broker_id: &str) -> bool;
}

/// HTTP gateway for NGSI-LD subscriptions.
#[derive(Debug, Clone)]
pub struct BrokerGateway {
    endpoint: BrokerEndpoint,
}

impl BrokerGateway {
    /// Create a gateway for the broker at `broker_url` (for example
    /// `http://localhost:1026`).
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError::InvalidBrokerUrl`] when the URL is not an http(s) base.
    pub fn new(broker_url: &str) -> Result<Self> {
        Self::with_client(broker_url, Client::new())
    }

    /// Same as [`BrokerGateway::new`] with a per-request timeout.
    pub fn with_timeout(broker_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: BrokerEndpoint::with_timeout(broker_url, timeout)?,
        })
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(broker_url: &str, client: Client) -> Result<Self> {
        Ok(Self {
            endpoint: BrokerEndpoint::new(broker_url, client)?,
        })
    }

    /// The broker base URL, without trailing slash.
    pub fn broker_url(&self) -> &str {
        self.endpoint.base()
    }

    fn collection_url(&self) -> String {
        self.endpoint.url(SUBSCRIPTIONS_PATH)
    }

    fn subscription_url(&self, broker_id: &str) -> String {
        self.endpoint
            .url(&format!("{SUBSCRIPTIONS_PATH}/{broker_id}"))
    }

    /// POST a new subscription. Expects `201 Created` with a `Location` header.
    pub async fn try_create(&self, document: &SubscriptionDocument) -> Result<String> {
        let body = serde_json::to_string(document)?;
        let response = self
            .endpoint
            .client()
            .post(self.collection_url())
            .header(CONTENT_TYPE, LD_JSON)
            .body(body)
            .send()
            .await?;
        let response = expect_status(response, &[201]).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(broker_id_from_location)
            .filter(|id| !id.is_empty())
            .ok_or(NgsiError::MissingLocation)
    }

    /// GET every subscription. Array elements that are not subscriptions are skipped.
    pub async fn try_list(&self) -> Result<Vec<BrokerSubscription>> {
        let response = self
            .endpoint
            .client()
            .get(self.collection_url())
            .header(ACCEPT, LD_JSON)
            .send()
            .await?;
        let response = expect_status(response, &[200]).await?;

        let text = response.text().await?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| NgsiError::InvalidBody(e.to_string()))?;
        let Value::Array(items) = value else {
            return Err(NgsiError::InvalidBody(
                "expected a JSON array of subscriptions".to_string(),
            ));
        };

        let subscriptions = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<BrokerSubscription>(item) {
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    tracing::debug!("Skipping unparseable subscription entry: {e}");
                    None
                }
            })
            .collect();
        Ok(subscriptions)
    }

    /// PATCH a subscription with a merge-patch body. Expects `204 No Content`.
    pub async fn try_update(&self, broker_id: &str, patch: &SubscriptionPatch) -> Result<()> {
        let body = serde_json::to_string(patch)?;
        let response = self
            .endpoint
            .client()
            .patch(self.subscription_url(broker_id))
            .header(CONTENT_TYPE, MERGE_PATCH_JSON)
            .body(body)
            .send()
            .await?;
        expect_status(response, &[204]).await?;
        Ok(())
    }

    /// DELETE a subscription. Expects `204 No Content`.
    pub async fn try_delete(&self, broker_id: &str) -> Result<()> {
        let response = self
            .endpoint
            .client()
            .delete(self.subscription_url(broker_id))
            .header(ACCEPT, LD_JSON)
            .send()
            .await?;
        expect_status(response, &[204]).await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionBroker for BrokerGateway {
    async fn create(&self, document: &SubscriptionDocument) -> Option<String> {
        match self.try_create(document).await {
            Ok(broker_id) => {
                tracing::info!("Subscription created successfully: {broker_id}");
                Some(broker_id)
            }
            Err(NgsiError::MissingLocation) => {
                tracing::warn!("Subscription created but the broker returned no Location header");
                None
            }
            Err(e) => {
                tracing::error!("Failed to create subscription: {e}");
                None
            }
        }
    }

    async fn list(&self) -> Vec<BrokerSubscription> {
        match self.try_list().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!("Failed to list subscriptions: {e}");
                Vec::new()
            }
        }
    }

    async fn update(&self, broker_id: &str, patch: &SubscriptionPatch) -> bool {
        match self.try_update(broker_id, patch).await {
            Ok(()) => {
                tracing::info!("Subscription {broker_id} updated");
                true
            }
            Err(e) => {
                tracing::error!("Failed to update subscription {broker_id}: {e}");
                false
            }
        }
    }

    async fn delete(&self, broker_id: &str) -> bool {
        match self.try_delete(broker_id).await {
            Ok(()) => {
                tracing::info!("Subscription {broker_id} deleted");
                true
            }
            Err(e) => {
                tracing::error!("Failed to delete subscription {broker_id}: {e}");
                false
            }
        }
    }
}

/// Brokers answer either with the bare id or with the subscription's path or URL.
fn broker_id_from_location(location: &str) -> String {
    let marker = format!("/{SUBSCRIPTIONS_PATH}/");
    match location.rfind(&marker) {
        Some(index) => location[index + marker.len()..].to_string(),
        None => location.to_string(),
    }
}
