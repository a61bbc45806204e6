//! Reconciliation of the desired subscription against the broker.
//!
//! One pass per artifact run:
//!
//! 1. **Discover** the broker subscriptions tagged with this artifact's identity
//! 2. **Branch** on the deletion flags: delete everything owned, or delete one
//!    identifier and optionally stop there
//! 3. **Match** existing subscriptions selecting the same entities, watched
//!    attributes and filter
//! 4. **Create or update**: retarget the first match when asked to, otherwise
//!    create a new subscription
//!
//! No broker failure aborts the pass. Every step logs and falls through to the
//! next sensible state.

use std::collections::HashMap;
use std::sync::Arc;

use ngsi_client::{BrokerSubscription, SubscriptionBroker, SubscriptionDocument};

use crate::config::SubscriptionConfig;
use crate::ownership::OwnershipTag;
use crate::registry::{ActiveSubscriptionRegistry, SubscriptionIdentifier};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every owned subscription was targeted for deletion
    DeletedAll { deleted: usize, failed: usize },
    /// A single identifier was targeted and nothing else was done
    DeletedOnly {
        identifier: SubscriptionIdentifier,
        deleted: bool,
    },
    /// A new subscription was created
    Created {
        identifier: SubscriptionIdentifier,
        broker_id: String,
    },
    /// An existing matching subscription was retargeted and adopted
    Updated {
        identifier: SubscriptionIdentifier,
        broker_id: String,
    },
    /// Creation failed; the broker holds nothing for this identifier
    NotCreated { identifier: SubscriptionIdentifier },
}

impl ReconcileOutcome {
    /// Whether an active subscription now exists and notifications should be awaited.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Created { .. } | ReconcileOutcome::Updated { .. }
        )
    }
}

/// Drives the broker towards the configured subscription.
pub struct Reconciler {
    broker: Arc<dyn SubscriptionBroker>,
    registry: ActiveSubscriptionRegistry,
    identity: String,
}

impl Reconciler {
    pub fn new(
        broker: Arc<dyn SubscriptionBroker>,
        registry: ActiveSubscriptionRegistry,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            registry,
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Owned subscriptions currently on the broker, identifier to broker id.
    pub async fn discover(&self) -> HashMap<SubscriptionIdentifier, String> {
        let listed = self.broker.list().await;
        self.owned_in(&listed)
    }

    fn owned_in(&self, listed: &[BrokerSubscription]) -> HashMap<SubscriptionIdentifier, String> {
        let owned: HashMap<_, _> = listed
            .iter()
            .filter_map(|subscription| {
                let tag = OwnershipTag::parse(subscription.description.as_deref()?)?;
                tag.is_owned_by(&self.identity)
                    .then(|| (tag.identifier, subscription.id.clone()))
            })
            .collect();

        tracing::info!(
            "Found {} subscription(s) owned by {} among {} on the broker",
            owned.len(),
            self.identity,
            listed.len()
        );
        owned
    }

    /// Delete every subscription owned by this artifact, then clear the registry.
    ///
    /// Targets the owned subscriptions found on the broker plus anything already
    /// in the registry. Returns `(deleted, failed)`. The registry is empty
    /// afterwards whatever the individual results.
    pub async fn delete_artifact_subscriptions(&self) -> (usize, usize) {
        let owned = self.discover().await;
        self.delete_all_in(owned).await
    }

    async fn delete_all_in(&self, mut owned: HashMap<SubscriptionIdentifier, String>) -> (usize, usize) {
        for (identifier, broker_id) in self.registry.snapshot().await {
            owned.entry(identifier).or_insert(broker_id);
        }

        let mut deleted = 0;
        let mut failed = 0;
        for (identifier, broker_id) in &owned {
            if self.broker.delete(broker_id).await {
                tracing::info!("Deleted subscription {identifier} ({broker_id})");
                deleted += 1;
            } else {
                failed += 1;
            }
        }

        self.registry.clear().await;
        if failed > 0 {
            tracing::warn!("{failed} owned subscription(s) could not be deleted");
        }
        (deleted, failed)
    }

    /// Delete the owned subscription registered under `identifier`.
    ///
    /// Returns `false` when it is not owned by this artifact or the broker
    /// refuses the deletion.
    pub async fn delete_subscription_by_identifier(&self, identifier: &SubscriptionIdentifier) -> bool {
        let owned = self.discover().await;
        self.delete_one_in(&owned, identifier).await.is_some()
    }

    async fn delete_one_in(
        &self,
        owned: &HashMap<SubscriptionIdentifier, String>,
        identifier: &SubscriptionIdentifier,
    ) -> Option<String> {
        let broker_id = match owned.get(identifier) {
            Some(broker_id) => broker_id.clone(),
            None => match self.registry.get(identifier).await {
                Some(broker_id) => broker_id,
                None => {
                    tracing::warn!("No subscription owned by {} with identifier {identifier}", self.identity);
                    return None;
                }
            },
        };

        if !self.broker.delete(&broker_id).await {
            return None;
        }
        self.registry.remove(identifier).await;
        tracing::info!("Deleted subscription {identifier} ({broker_id})");
        Some(broker_id)
    }

    /// Existing subscriptions selecting the same data as `desired`.
    pub fn find_similar<'a>(
        listed: &'a [BrokerSubscription],
        desired: &SubscriptionDocument,
    ) -> Vec<&'a BrokerSubscription> {
        listed
            .iter()
            .filter(|subscription| subscription.selects_same_as(desired))
            .collect()
    }

    /// Run one pass for `desired`, managed under `identifier`.
    pub async fn reconcile(
        &self,
        config: &SubscriptionConfig,
        identifier: &SubscriptionIdentifier,
        desired: &SubscriptionDocument,
    ) -> ReconcileOutcome {
        let mut listed = self.broker.list().await;
        let owned = self.owned_in(&listed);

        if config.delete_all_artefact_subscriptions {
            let (deleted, failed) = self.delete_all_in(owned).await;
            return ReconcileOutcome::DeletedAll { deleted, failed };
        }

        if let Some(target) = config.deletion_target() {
            let target = SubscriptionIdentifier::new(target);
            let deleted_id = self.delete_one_in(&owned, &target).await;
            if let Some(broker_id) = &deleted_id {
                listed.retain(|subscription| &subscription.id != broker_id);
            }
            if config.delete_only {
                return ReconcileOutcome::DeletedOnly {
                    identifier: target,
                    deleted: deleted_id.is_some(),
                };
            }
        }

        let similar = Self::find_similar(&listed, desired);
        if let Some(existing) = similar.first() {
            if config.update_existing_subscription {
                if self
                    .broker
                    .update(&existing.id, &desired.retarget_patch())
                    .await
                {
                    self.registry.record(identifier.clone(), existing.id.clone()).await;
                    return ReconcileOutcome::Updated {
                        identifier: identifier.clone(),
                        broker_id: existing.id.clone(),
                    };
                }
                tracing::warn!(
                    "Could not update subscription {}, creating a new one",
                    existing.id
                );
            } else {
                tracing::info!(
                    "{} similar subscription(s) already exist, creating a new one",
                    similar.len()
                );
            }
        }

        match self.broker.create(desired).await {
            Some(broker_id) => {
                self.registry.record(identifier.clone(), broker_id.clone()).await;
                ReconcileOutcome::Created {
                    identifier: identifier.clone(),
                    broker_id,
                }
            }
            None => ReconcileOutcome::NotCreated {
                identifier: identifier.clone(),
            },
        }
    }
}
