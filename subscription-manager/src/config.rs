//! Configuration types for the subscription manager
//!
//! [`SubscriptionConfig`] describes the subscription the manager should
//! maintain and is loaded from JSON. [`ManagerSettings`] holds the runtime
//! knobs (broker location, listener ports, timeouts).

use std::time::Duration;

use ngsi_client::{format_entity_id, ContextRef, SubscriptionDocument};
use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, Result};

/// The desired subscription, plus the deletion flags that steer reconciliation.
///
/// Every key is optional in JSON. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Entity type to subscribe to. Empty selects all types.
    pub entity_type: String,

    /// A single entity to subscribe to, bare or as a URN
    pub entity_id: Option<String>,

    /// Attributes that trigger notifications and are kept in them. Empty means all.
    pub watched_attributes: Vec<String>,

    /// JSON-LD context, one URI or a list. Defaults to the NGSI-LD core context.
    pub context: Option<ContextRef>,

    /// Broker-side filter expression
    pub q_filter: Option<String>,

    /// Identifier to manage the subscription under. Generated when absent.
    pub subscription_identifier: Option<String>,

    /// Delete every subscription owned by this artifact and stop
    #[serde(alias = "delete_all_artifact_subscriptions")]
    pub delete_all_artefact_subscriptions: bool,

    /// Delete the owned subscription registered under this identifier
    pub delete_subscription_identifier: Option<String>,

    /// Stop after `delete_subscription_identifier` instead of creating
    pub delete_only: bool,

    /// Retarget a matching existing subscription instead of creating a duplicate
    pub update_existing_subscription: bool,
}

impl SubscriptionConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ManagerError::Configuration(format!("Invalid subscription config: {e}")))
    }

    /// Watched attributes with surrounding whitespace trimmed and blanks dropped.
    pub fn watched_attributes(&self) -> Vec<String> {
        self.watched_attributes
            .iter()
            .map(|attribute| attribute.trim())
            .filter(|attribute| !attribute.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The entity id in URN form, if one is configured.
    pub fn formatted_entity_id(&self) -> Option<String> {
        format_entity_id(&self.entity_type, self.entity_id.as_deref().map(str::trim))
            .filter(|id| !id.is_empty())
    }

    /// The deletion target, ignoring blank values.
    pub fn deletion_target(&self) -> Option<&str> {
        self.delete_subscription_identifier
            .as_deref()
            .map(str::trim)
            .filter(|identifier| !identifier.is_empty())
    }

    /// Build the subscription document this configuration asks for.
    pub fn subscription_document(
        &self,
        endpoint_uri: &str,
        description: &str,
    ) -> SubscriptionDocument {
        let mut document = SubscriptionDocument::new(self.entity_type.trim(), endpoint_uri)
            .with_watched_attributes(self.watched_attributes())
            .with_context(self.context.clone().unwrap_or_default())
            .with_description(description);

        if let Some(entity_id) = self.formatted_entity_id() {
            document = document.with_entity_id(entity_id);
        }
        if let Some(q) = &self.q_filter {
            document = document.with_q(q.trim());
        }
        document
    }
}

/// Runtime settings for the subscription manager
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Base URL of the context broker
    /// Default: http://localhost:9090
    pub broker_url: String,

    /// Port range searched for the notification listener
    /// Default: (8000, 65000)
    pub callback_port_range: (u16, u16),

    /// Per-request timeout for broker calls
    /// Default: none, transport defaults apply
    pub request_timeout: Option<Duration>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            broker_url: "http://localhost:9090".to_string(),
            callback_port_range: callback_server::DEFAULT_PORT_RANGE,
            request_timeout: None,
        }
    }
}

impl ManagerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the settings and return the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.broker_url.trim().is_empty() {
            return Err(ManagerError::Configuration(
                "Broker URL must not be empty".to_string(),
            ));
        }

        let (start, end) = self.callback_port_range;
        if start == 0 || start > end {
            return Err(ManagerError::Configuration(format!(
                "Invalid callback port range: {start}-{end}"
            )));
        }

        if self.request_timeout == Some(Duration::ZERO) {
            return Err(ManagerError::Configuration(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_broker_url(mut self, broker_url: impl Into<String>) -> Self {
        self.broker_url = broker_url.into();
        self
    }

    pub fn with_callback_port_range(mut self, start: u16, end: u16) -> Self {
        self.callback_port_range = (start, end);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
