//! Subscription documents exchanged with the broker.
//!
//! [`SubscriptionDocument`] is what this system creates, [`BrokerSubscription`] is
//! what the broker lists back (parsed leniently, since other clients create
//! subscriptions too), and [`SubscriptionPatch`] is a merge-patch body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The NGSI-LD core context, used when no context is configured.
pub const NGSI_LD_CORE_CONTEXT: &str =
    "https://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld";

/// Content type advertised on notification endpoints.
const NOTIFICATION_ACCEPT: &str = "application/json";

/// A JSON-LD `@context` reference: one URI or a list of URIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextRef {
    Single(String),
    Multiple(Vec<String>),
}

impl Default for ContextRef {
    fn default() -> Self {
        ContextRef::Single(NGSI_LD_CORE_CONTEXT.to_string())
    }
}

impl ContextRef {
    /// The context as a JSON value, for embedding in entity fragments.
    pub fn to_value(&self) -> Value {
        match self {
            ContextRef::Single(uri) => Value::String(uri.clone()),
            ContextRef::Multiple(uris) => {
                Value::Array(uris.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

impl From<&str> for ContextRef {
    fn from(uri: &str) -> Self {
        ContextRef::Single(uri.to_string())
    }
}

impl From<Vec<String>> for ContextRef {
    fn from(uris: Vec<String>) -> Self {
        ContextRef::Multiple(uris)
    }
}

/// One entry of a subscription's `entities` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySelector {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "idPattern", default, skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<String>,
}

impl EntitySelector {
    /// Select every entity of `entity_type`.
    pub fn of_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            id_pattern: None,
        }
    }

    /// Narrow the selector to a single entity.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Where and how the broker delivers notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub uri: String,
    pub accept: String,
}

impl Endpoint {
    /// JSON endpoint at `uri`.
    pub fn json(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            accept: NOTIFICATION_ACCEPT.to_string(),
        }
    }
}

/// The `notification` member of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationParams {
    pub endpoint: Endpoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

/// A subscription document as created by this system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionDocument {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entities: Vec<EntitySelector>,
    #[serde(
        rename = "watchedAttributes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub watched_attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    pub notification: NotificationParams,
    #[serde(rename = "@context")]
    pub context: ContextRef,
}

impl SubscriptionDocument {
    /// Subscribe to every entity of `entity_type`, notifying `endpoint_uri`.
    pub fn new(entity_type: impl Into<String>, endpoint_uri: impl Into<String>) -> Self {
        Self {
            kind: "Subscription".to_string(),
            description: None,
            entities: vec![EntitySelector::of_type(entity_type)],
            watched_attributes: Vec::new(),
            q: None,
            notification: NotificationParams {
                endpoint: Endpoint::json(endpoint_uri),
                attributes: Vec::new(),
            },
            context: ContextRef::default(),
        }
    }

    /// Restrict the subscription to one entity. Empty ids are ignored.
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.is_empty() {
            for selector in &mut self.entities {
                selector.id = Some(id.clone());
            }
        }
        self
    }

    /// Watch `attributes` and receive only those in notifications.
    pub fn with_watched_attributes(mut self, attributes: Vec<String>) -> Self {
        self.notification.attributes = attributes.clone();
        self.watched_attributes = attributes;
        self
    }

    /// Attach a filter expression. Empty filters are dropped.
    pub fn with_q(mut self, q: impl Into<String>) -> Self {
        let q = q.into();
        self.q = (!q.is_empty()).then_some(q);
        self
    }

    pub fn with_context(mut self, context: ContextRef) -> Self {
        self.context = context;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Merge-patch that points an existing subscription at this document's
    /// description, endpoint and context.
    pub fn retarget_patch(&self) -> SubscriptionPatch {
        SubscriptionPatch {
            description: self.description.clone(),
            notification: Some(self.notification.clone()),
            context: Some(self.context.clone()),
            ..SubscriptionPatch::default()
        }
    }
}

/// A subscription as listed by the broker.
///
/// Only `id` is required. Everything else is optional because the broker also
/// holds subscriptions created by other clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrokerSubscription {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entities: Option<Vec<EntitySelector>>,
    #[serde(rename = "watchedAttributes", default)]
    pub watched_attributes: Option<Vec<String>>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub notification: Option<Value>,
}

impl BrokerSubscription {
    /// Whether this subscription selects the same data as `document`.
    ///
    /// Compares `entities`, `watchedAttributes` and `q`. Absent lists equal empty
    /// lists and an absent `q` equals an empty one.
    pub fn selects_same_as(&self, document: &SubscriptionDocument) -> bool {
        let entities = self.entities.as_deref().unwrap_or_default();
        let watched = self.watched_attributes.as_deref().unwrap_or_default();
        let q = self.q.as_deref().unwrap_or_default();

        entities == document.entities.as_slice()
            && watched == document.watched_attributes.as_slice()
            && q == document.q.as_deref().unwrap_or_default()
    }
}

/// Body of a `PATCH` on a subscription. Unset members are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntitySelector>>,
    #[serde(rename = "watchedAttributes", skip_serializing_if = "Option::is_none")]
    pub watched_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationParams>,
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextRef>,
}
