//! The subscription manager artifact and its run sequence.

use std::future::Future;
use std::sync::Arc;

use artifact_bus::{ArtifactRuntime, BusError, Presence};
use callback_server::CallbackServer;
use ngsi_client::{BrokerGateway, SubscriptionBroker, SubscriptionDocument};
use tokio::sync::RwLock;

use crate::config::{ManagerSettings, SubscriptionConfig};
use crate::error::Result;
use crate::notification::NotificationRouter;
use crate::ownership::OwnershipTag;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::registry::{ActiveSubscriptionRegistry, SubscriptionIdentifier};

/// Where the running artifact receives notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerEndpoint {
    /// Local port of the listener
    pub port: u16,
    /// URI registered with the broker
    pub notify_url: String,
}

/// Keeps one broker subscription in place for the lifetime of a run and relays
/// its notifications to linked peers.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use artifact_bus::InProcessBus;
/// use subscription_manager::{ManagerSettings, SubscriptionConfig, SubscriptionManagerArtifact};
///
/// # #[tokio::main]
/// # async fn main() -> subscription_manager::Result<()> {
/// let bus = InProcessBus::new();
/// let config = SubscriptionConfig {
///     entity_type: "WasteContainer".to_string(),
///     watched_attributes: vec!["fillingLevel".to_string()],
///     ..Default::default()
/// };
/// let settings = ManagerSettings::new().with_broker_url("http://localhost:1026");
///
/// let artifact = SubscriptionManagerArtifact::new(
///     Arc::new(bus.handle("subscriber@localhost")),
///     settings,
///     config,
/// )?;
///
/// let outcome = artifact
///     .run(async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await?;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
pub struct SubscriptionManagerArtifact {
    runtime: Arc<dyn ArtifactRuntime>,
    settings: ManagerSettings,
    config: SubscriptionConfig,
    identifier: SubscriptionIdentifier,
    registry: ActiveSubscriptionRegistry,
    reconciler: Reconciler,
    router: Arc<NotificationRouter>,
    endpoint: RwLock<Option<ListenerEndpoint>>,
}

impl SubscriptionManagerArtifact {
    /// Create an artifact talking HTTP to `settings.broker_url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings are invalid or the broker URL is unusable.
    pub fn new(
        runtime: Arc<dyn ArtifactRuntime>,
        settings: ManagerSettings,
        config: SubscriptionConfig,
    ) -> Result<Self> {
        settings.validate()?;
        let gateway = match settings.request_timeout {
            Some(timeout) => BrokerGateway::with_timeout(&settings.broker_url, timeout)?,
            None => BrokerGateway::new(&settings.broker_url)?,
        };
        Self::with_broker(runtime, Arc::new(gateway), settings, config)
    }

    /// Create an artifact driven by any [`SubscriptionBroker`].
    pub fn with_broker(
        runtime: Arc<dyn ArtifactRuntime>,
        broker: Arc<dyn SubscriptionBroker>,
        settings: ManagerSettings,
        config: SubscriptionConfig,
    ) -> Result<Self> {
        settings.validate()?;

        let identifier = match config.subscription_identifier.as_deref().map(str::trim) {
            Some(identifier) if !identifier.is_empty() => SubscriptionIdentifier::new(identifier),
            _ => SubscriptionIdentifier::generate(),
        };
        let registry = ActiveSubscriptionRegistry::new();
        let reconciler = Reconciler::new(broker, registry.clone(), runtime.identity());
        let router = Arc::new(NotificationRouter::new(
            runtime.clone(),
            config.watched_attributes(),
        ));

        Ok(Self {
            runtime,
            settings,
            config,
            identifier,
            registry,
            reconciler,
            router,
            endpoint: RwLock::new(None),
        })
    }

    pub fn identity(&self) -> &str {
        self.runtime.identity()
    }

    /// Identifier the desired subscription is managed under.
    pub fn identifier(&self) -> &SubscriptionIdentifier {
        &self.identifier
    }

    pub fn registry(&self) -> &ActiveSubscriptionRegistry {
        &self.registry
    }

    pub fn router(&self) -> Arc<NotificationRouter> {
        self.router.clone()
    }

    /// The listener endpoint while a run is in progress.
    pub async fn listener_endpoint(&self) -> Option<ListenerEndpoint> {
        self.endpoint.read().await.clone()
    }

    /// The description that marks subscriptions as ours.
    pub fn ownership_tag(&self) -> OwnershipTag {
        OwnershipTag::new(self.identity(), self.identifier.clone())
    }

    /// The subscription this artifact maintains, notifying `notify_url`.
    pub fn desired_subscription(&self, notify_url: &str) -> SubscriptionDocument {
        self.config
            .subscription_document(notify_url, &self.ownership_tag().to_string())
    }

    /// Advertise availability. Failures are logged only.
    pub fn setup(&self) {
        if let Err(e) = self.runtime.set_presence(Presence::Available) {
            tracing::error!("Failed to set presence: {e}");
        }
    }

    /// Run the artifact until `shutdown` resolves.
    ///
    /// Starts the notification listener, reconciles the broker, then idles while
    /// notifications flow. On shutdown every owned subscription is deleted before
    /// the listener and the messaging runtime stop. Runs that only delete return
    /// without idling.
    ///
    /// # Errors
    ///
    /// Fails when the messaging runtime cannot start or the listener cannot bind.
    /// Broker failures never fail the run.
    pub async fn run<F>(&self, shutdown: F) -> Result<ReconcileOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        match self.runtime.start().await {
            Ok(()) | Err(BusError::AlreadyStarted(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.setup();

        let server =
            match CallbackServer::new(self.settings.callback_port_range, self.router.clone()).await {
                Ok(server) => server,
                Err(e) => {
                    tracing::error!("Could not start notification server: {e}");
                    if let Err(stop_error) = self.runtime.stop().await {
                        tracing::error!("Error stopping messaging runtime: {stop_error}");
                    }
                    return Err(e.into());
                }
            };
        let notify_url = server.notify_url();
        tracing::info!("Local IP: {}", server.local_ip());
        *self.endpoint.write().await = Some(ListenerEndpoint {
            port: server.port(),
            notify_url: notify_url.clone(),
        });

        let desired = self.desired_subscription(&notify_url);
        tracing::debug!(
            "Desired subscription: {}",
            serde_json::to_string(&desired).unwrap_or_default()
        );

        let outcome = self
            .reconciler
            .reconcile(&self.config, &self.identifier, &desired)
            .await;
        tracing::info!("Reconciliation finished: {outcome:?}");

        let deletion_only = matches!(
            outcome,
            ReconcileOutcome::DeletedAll { .. } | ReconcileOutcome::DeletedOnly { .. }
        );
        if !deletion_only {
            if !outcome.is_active() {
                tracing::warn!("No subscription is active, listening until shutdown anyway");
            }
            tracing::info!("Notification server is running on {notify_url}");
            shutdown.await;
            tracing::info!("Shutting down subscription manager {}", self.identity());
            self.cleanup().await;
        }

        *self.endpoint.write().await = None;
        if let Err(e) = server.shutdown().await {
            tracing::error!("Error stopping notification server: {e}");
        }
        if let Err(e) = self.runtime.stop().await {
            tracing::error!("Error stopping messaging runtime: {e}");
        }

        Ok(outcome)
    }

    /// Delete every subscription owned by this artifact. Never fails.
    pub async fn cleanup(&self) {
        let (deleted, failed) = self.reconciler.delete_artifact_subscriptions().await;
        tracing::info!("Cleanup deleted {deleted} subscription(s), {failed} failure(s)");
    }
}
