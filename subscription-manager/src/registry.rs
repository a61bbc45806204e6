//! Identifier registry for the subscriptions this artifact manages.
//!
//! Broker-assigned ids change whenever a subscription is recreated, so the
//! artifact keys its subscriptions by a short local [`SubscriptionIdentifier`]
//! and records the current broker id against it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Prefix of generated identifiers.
pub const IDENTIFIER_PREFIX: &str = "sub_";

/// Number of hex characters after the prefix.
const IDENTIFIER_HEX_LEN: usize = 8;

/// Local, stable key for a managed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionIdentifier(String);

impl SubscriptionIdentifier {
    /// Wrap a configured identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// `sub_` followed by 8 lowercase hex characters taken from a v4 UUID.
    ///
    /// Collisions are unlikely but not checked.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("{IDENTIFIER_PREFIX}{}", &hex[..IDENTIFIER_HEX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionIdentifier {
    fn from(identifier: &str) -> Self {
        Self::new(identifier)
    }
}

impl From<String> for SubscriptionIdentifier {
    fn from(identifier: String) -> Self {
        Self(identifier)
    }
}

/// Identifier to broker subscription id, shared between the reconciler and the
/// artifact lifecycle. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ActiveSubscriptionRegistry {
    entries: Arc<RwLock<HashMap<SubscriptionIdentifier, String>>>,
}

impl ActiveSubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the broker id for `identifier`.
    pub async fn record(&self, identifier: SubscriptionIdentifier, broker_id: impl Into<String>) {
        let broker_id = broker_id.into();
        tracing::debug!("Recording subscription {identifier} -> {broker_id}");
        self.entries.write().await.insert(identifier, broker_id);
    }

    /// Remove `identifier`, returning the broker id it pointed to.
    pub async fn remove(&self, identifier: &SubscriptionIdentifier) -> Option<String> {
        self.entries.write().await.remove(identifier)
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn get(&self, identifier: &SubscriptionIdentifier) -> Option<String> {
        self.entries.read().await.get(identifier).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Identifiers currently recorded, in no particular order.
    pub async fn owned_identifiers(&self) -> Vec<SubscriptionIdentifier> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Copy of the whole map.
    pub async fn snapshot(&self) -> HashMap<SubscriptionIdentifier, String> {
        self.entries.read().await.clone()
    }
}
