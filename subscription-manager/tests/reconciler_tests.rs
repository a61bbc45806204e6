//! Reconciliation scenarios against an in-memory broker.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ngsi_client::{BrokerSubscription, SubscriptionBroker, SubscriptionDocument, SubscriptionPatch};
use rstest::rstest;
use serde_json::json;
use subscription_manager::{
    ActiveSubscriptionRegistry, OwnershipTag, ReconcileOutcome, Reconciler, SubscriptionConfig,
    SubscriptionIdentifier,
};

const IDENTITY: &str = "subscriber@localhost";
const NOTIFY_URL: &str = "http://10.0.0.5:8000/notify";

/// Records every call and answers from canned state.
#[derive(Default)]
struct FakeBroker {
    listed: Mutex<Vec<BrokerSubscription>>,
    created: Mutex<Vec<SubscriptionDocument>>,
    updated: Mutex<Vec<(String, SubscriptionPatch)>>,
    deleted: Mutex<Vec<String>>,
    create_result: Option<String>,
    refuse_update: bool,
    refuse_delete: HashSet<String>,
}

impl FakeBroker {
    fn with_subscriptions(subscriptions: Vec<BrokerSubscription>) -> Self {
        Self {
            listed: Mutex::new(subscriptions),
            create_result: Some("urn:ngsi-ld:Subscription:new".to_string()),
            ..Default::default()
        }
    }

    fn created(&self) -> Vec<SubscriptionDocument> {
        self.created.lock().unwrap().clone()
    }

    fn updated(&self) -> Vec<(String, SubscriptionPatch)> {
        self.updated.lock().unwrap().clone()
    }

    fn deleted(&self) -> Vec<String> {
        let mut deleted = self.deleted.lock().unwrap().clone();
        deleted.sort();
        deleted
    }
}

#[async_trait]
impl SubscriptionBroker for FakeBroker {
    async fn create(&self, document: &SubscriptionDocument) -> Option<String> {
        self.created.lock().unwrap().push(document.clone());
        self.create_result.clone()
    }

    async fn list(&self) -> Vec<BrokerSubscription> {
        self.listed.lock().unwrap().clone()
    }

    async fn update(&self, broker_id: &str, patch: &SubscriptionPatch) -> bool {
        self.updated
            .lock()
            .unwrap()
            .push((broker_id.to_string(), patch.clone()));
        !self.refuse_update
    }

    async fn delete(&self, broker_id: &str) -> bool {
        self.deleted.lock().unwrap().push(broker_id.to_string());
        if self.refuse_delete.contains(broker_id) {
            return false;
        }
        self.listed
            .lock()
            .unwrap()
            .retain(|subscription| subscription.id != broker_id);
        true
    }
}

fn subscription(id: &str, description: Option<&str>, entity_type: &str) -> BrokerSubscription {
    let mut value = json!({
        "id": id,
        "type": "Subscription",
        "entities": [{"type": entity_type}],
        "watchedAttributes": ["temperature"]
    });
    if let Some(description) = description {
        value["description"] = json!(description);
    }
    serde_json::from_value(value).unwrap()
}

fn owned(id: &str, identifier: &str) -> BrokerSubscription {
    let tag = OwnershipTag::new(IDENTITY, identifier.into());
    subscription(id, Some(&tag.to_string()), "Room")
}

fn foreign(id: &str, identifier: &str) -> BrokerSubscription {
    let tag = OwnershipTag::new("someone@else", identifier.into());
    subscription(id, Some(&tag.to_string()), "Room")
}

fn room_config() -> SubscriptionConfig {
    SubscriptionConfig {
        entity_type: "Room".to_string(),
        watched_attributes: vec!["temperature".to_string()],
        ..Default::default()
    }
}

fn desired(config: &SubscriptionConfig, identifier: &SubscriptionIdentifier) -> SubscriptionDocument {
    let tag = OwnershipTag::new(IDENTITY, identifier.clone());
    config.subscription_document(NOTIFY_URL, &tag.to_string())
}

fn reconciler(broker: &Arc<FakeBroker>) -> (Reconciler, ActiveSubscriptionRegistry) {
    let registry = ActiveSubscriptionRegistry::new();
    let reconciler = Reconciler::new(broker.clone(), registry.clone(), IDENTITY);
    (reconciler, registry)
}

#[tokio::test]
async fn discovery_keeps_only_well_formed_owned_tags() {
    let broker = Arc::new(FakeBroker::with_subscriptions(vec![
        owned("b1", "sub_00000001"),
        owned("b2", "sub_00000002"),
        foreign("b3", "sub_00000003"),
        subscription("b4", None, "Room"),
        subscription("b5", Some("Artifact-ID: subscriber@localhost, Sub-ID: "), "Room"),
        subscription("b6", Some("Artifact-ID: subscriber@localhost"), "Room"),
        subscription("b7", Some("created by hand"), "Room"),
    ]));
    let (reconciler, _) = reconciler(&broker);

    let discovered = reconciler.discover().await;

    assert_eq!(discovered.len(), 2);
    assert_eq!(discovered[&SubscriptionIdentifier::new("sub_00000001")], "b1");
    assert_eq!(discovered[&SubscriptionIdentifier::new("sub_00000002")], "b2");
}

#[tokio::test]
async fn creation_records_location_under_identifier() {
    let broker = Arc::new(FakeBroker {
        create_result: Some("urn:ngsi-ld:Subscription:123".to_string()),
        ..Default::default()
    });
    let (reconciler, registry) = reconciler(&broker);
    let config = SubscriptionConfig {
        entity_type: "TestDevice".to_string(),
        watched_attributes: vec!["temperature".to_string(), "humidity".to_string()],
        ..Default::default()
    };
    let identifier = SubscriptionIdentifier::generate();

    let outcome = reconciler
        .reconcile(&config, &identifier, &desired(&config, &identifier))
        .await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Created {
            identifier: identifier.clone(),
            broker_id: "urn:ngsi-ld:Subscription:123".to_string(),
        }
    );
    assert_eq!(
        registry.get(&identifier).await.as_deref(),
        Some("urn:ngsi-ld:Subscription:123")
    );

    let created = broker.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].watched_attributes, vec!["temperature", "humidity"]);
    let tag = OwnershipTag::parse(created[0].description.as_deref().unwrap()).unwrap();
    assert_eq!(tag, OwnershipTag::new(IDENTITY, identifier));
}

#[tokio::test]
async fn failed_creation_leaves_registry_unchanged() {
    let broker = Arc::new(FakeBroker::default());
    let (reconciler, registry) = reconciler(&broker);
    let config = room_config();
    let identifier = SubscriptionIdentifier::new("sub_aaaaaaaa");

    let outcome = reconciler
        .reconcile(&config, &identifier, &desired(&config, &identifier))
        .await;

    assert_eq!(outcome, ReconcileOutcome::NotCreated { identifier });
    assert!(!outcome.is_active());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn delete_all_clears_registry_even_on_failures() {
    let broker = Arc::new(FakeBroker {
        refuse_delete: HashSet::from(["b2".to_string()]),
        ..FakeBroker::with_subscriptions(vec![
            owned("b1", "sub_00000001"),
            owned("b2", "sub_00000002"),
            foreign("b3", "sub_00000003"),
        ])
    });
    let (reconciler, registry) = reconciler(&broker);
    registry.record("sub_00000009".into(), "b9").await;

    let config = SubscriptionConfig {
        delete_all_artefact_subscriptions: true,
        ..room_config()
    };
    let identifier = SubscriptionIdentifier::new("sub_00000010");
    let outcome = reconciler
        .reconcile(&config, &identifier, &desired(&config, &identifier))
        .await;

    assert_eq!(outcome, ReconcileOutcome::DeletedAll { deleted: 2, failed: 1 });
    assert_eq!(broker.deleted(), vec!["b1", "b2", "b9"]);
    assert!(registry.is_empty().await);
    assert!(broker.created().is_empty());
}

#[tokio::test]
async fn delete_all_takes_precedence_over_single_deletion() {
    let broker = Arc::new(FakeBroker::with_subscriptions(vec![
        owned("b1", "sub_00000001"),
        owned("b2", "sub_00000002"),
        foreign("b3", "sub_00000003"),
    ]));
    let (reconciler, registry) = reconciler(&broker);
    let config = SubscriptionConfig {
        delete_all_artefact_subscriptions: true,
        delete_subscription_identifier: Some("sub_00000001".to_string()),
        delete_only: false,
        ..room_config()
    };
    let identifier = SubscriptionIdentifier::new("sub_00000004");

    let outcome = reconciler
        .reconcile(&config, &identifier, &desired(&config, &identifier))
        .await;

    assert_eq!(outcome, ReconcileOutcome::DeletedAll { deleted: 2, failed: 0 });
    // Each owned subscription is deleted exactly once.
    assert_eq!(broker.deleted(), vec!["b1", "b2"]);
    assert!(broker.created().is_empty());
    assert!(broker.updated().is_empty());
    assert!(registry.is_empty().await);
}

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test]
async fn delete_by_identifier_then_maybe_create(#[case] delete_only: bool) {
    let broker = Arc::new(FakeBroker::with_subscriptions(vec![
        owned("b1", "sub_00000001"),
        owned("b2", "sub_00000002"),
    ]));
    let (reconciler, registry) = reconciler(&broker);
    let config = SubscriptionConfig {
        delete_subscription_identifier: Some("sub_00000001".to_string()),
        delete_only,
        ..room_config()
    };
    let identifier = SubscriptionIdentifier::new("sub_00000003");

    let outcome = reconciler
        .reconcile(&config, &identifier, &desired(&config, &identifier))
        .await;

    assert_eq!(broker.deleted(), vec!["b1"]);
    if delete_only {
        assert_eq!(
            outcome,
            ReconcileOutcome::DeletedOnly {
                identifier: "sub_00000001".into(),
                deleted: true,
            }
        );
        assert!(broker.created().is_empty());
        assert!(registry.is_empty().await);
    } else {
        assert!(outcome.is_active());
        assert_eq!(broker.created().len(), 1);
        assert_eq!(
            registry.get(&identifier).await.as_deref(),
            Some("urn:ngsi-ld:Subscription:new")
        );
    }
}

#[tokio::test]
async fn deleting_unknown_identifier_is_false() {
    let broker = Arc::new(FakeBroker::with_subscriptions(vec![
        owned("b1", "sub_00000001"),
        foreign("b2", "sub_00000002"),
    ]));
    let (reconciler, _) = reconciler(&broker);

    assert!(!reconciler.delete_subscription_by_identifier(&"sub_00000002".into()).await);
    assert!(!reconciler.delete_subscription_by_identifier(&"sub_ffffffff".into()).await);
    assert!(broker.deleted().is_empty());

    assert!(reconciler.delete_subscription_by_identifier(&"sub_00000001".into()).await);
    assert_eq!(broker.deleted(), vec!["b1"]);
}

#[tokio::test]
async fn similar_subscription_is_updated_when_asked() {
    let broker = Arc::new(FakeBroker::with_subscriptions(vec![
        foreign("b1", "sub_00000001"),
        subscription("b2", None, "Room"),
    ]));
    let (reconciler, registry) = reconciler(&broker);
    let config = SubscriptionConfig {
        update_existing_subscription: true,
        ..room_config()
    };
    let identifier = SubscriptionIdentifier::new("sub_00000004");
    let desired = desired(&config, &identifier);

    let outcome = reconciler.reconcile(&config, &identifier, &desired).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            identifier: identifier.clone(),
            broker_id: "b1".to_string(),
        }
    );
    assert_eq!(registry.get(&identifier).await.as_deref(), Some("b1"));
    assert!(broker.created().is_empty());

    let updated = broker.updated();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0, "b1");
    assert_eq!(updated[0].1, desired.retarget_patch());
}

#[tokio::test]
async fn similar_subscription_is_ignored_by_default() {
    let broker = Arc::new(FakeBroker::with_subscriptions(vec![subscription(
        "b1", None, "Room",
    )]));
    let (reconciler, _) = reconciler(&broker);
    let config = room_config();
    let identifier = SubscriptionIdentifier::new("sub_00000005");

    let outcome = reconciler
        .reconcile(&config, &identifier, &desired(&config, &identifier))
        .await;

    assert!(matches!(outcome, ReconcileOutcome::Created { .. }));
    assert!(broker.updated().is_empty());
    assert_eq!(broker.created().len(), 1);
}

#[tokio::test]
async fn refused_update_falls_back_to_creation() {
    let broker = Arc::new(FakeBroker {
        refuse_update: true,
        ..FakeBroker::with_subscriptions(vec![subscription("b1", None, "Room")])
    });
    let (reconciler, registry) = reconciler(&broker);
    let config = SubscriptionConfig {
        update_existing_subscription: true,
        ..room_config()
    };
    let identifier = SubscriptionIdentifier::new("sub_00000006");

    let outcome = reconciler
        .reconcile(&config, &identifier, &desired(&config, &identifier))
        .await;

    assert_eq!(broker.updated().len(), 1);
    assert_eq!(broker.created().len(), 1);
    assert_eq!(
        outcome,
        ReconcileOutcome::Created {
            identifier: identifier.clone(),
            broker_id: "urn:ngsi-ld:Subscription:new".to_string(),
        }
    );
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn dissimilar_subscriptions_are_not_updated() {
    let broker = Arc::new(FakeBroker::with_subscriptions(vec![subscription(
        "b1", None, "Car",
    )]));
    let (reconciler, _) = reconciler(&broker);
    let config = SubscriptionConfig {
        update_existing_subscription: true,
        ..room_config()
    };
    let identifier = SubscriptionIdentifier::new("sub_00000007");

    reconciler
        .reconcile(&config, &identifier, &desired(&config, &identifier))
        .await;

    assert!(broker.updated().is_empty());
    assert_eq!(broker.created().len(), 1);
}
