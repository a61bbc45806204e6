//! In-process artifact bus using Tokio channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::{BusError, Result};
use crate::runtime::{ArtifactRuntime, Presence, Publication, PublicationReceiver};

/// Default buffer size of every publisher topic.
const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// In-process message bus.
///
/// Every artifact identity owns one broadcast topic. Linking to a peer
/// subscribes to that peer's topic.
#[derive(Clone)]
pub struct InProcessBus {
    /// Publisher identity -> broadcast sender
    topics: Arc<DashMap<String, broadcast::Sender<Publication>>>,
    /// Identity -> advertised presence
    presence: Arc<DashMap<String, Presence>>,
    /// Buffer size for new topics
    capacity: usize,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a bus whose topics buffer `capacity` publications per receiver.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            presence: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Create the runtime handle for one artifact identity.
    pub fn handle(&self, identity: impl Into<String>) -> BusHandle {
        BusHandle {
            identity: identity.into(),
            bus: self.clone(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Presence last advertised by `identity`, if any.
    pub fn presence_of(&self, identity: &str) -> Option<Presence> {
        self.presence.get(identity).map(|p| *p)
    }

    /// Number of receivers currently linked to `identity`.
    pub fn linked_count(&self, identity: &str) -> usize {
        self.topics
            .get(identity)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn topic(&self, identity: &str) -> broadcast::Sender<Publication> {
        self.topics
            .entry(identity.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .clone()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One artifact's connection to an [`InProcessBus`].
#[derive(Clone)]
pub struct BusHandle {
    identity: String,
    bus: InProcessBus,
    running: Arc<AtomicBool>,
}

impl BusHandle {
    /// Whether `start` has been called without a matching `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(BusError::NotStarted(self.identity.clone()))
        }
    }
}

#[async_trait]
impl ArtifactRuntime for BusHandle {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BusError::AlreadyStarted(self.identity.clone()));
        }
        tracing::debug!("Artifact {} connected to in-process bus", self.identity);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.bus
            .presence
            .insert(self.identity.clone(), Presence::Unavailable);
        tracing::debug!("Artifact {} disconnected from in-process bus", self.identity);
        Ok(())
    }

    async fn publish(&self, payload: String) -> Result<()> {
        self.ensure_running()?;

        let publication = Publication {
            publisher: self.identity.clone(),
            payload,
        };

        // No linked peers is not an error: the publication is simply dropped.
        match self.bus.topic(&self.identity).send(publication) {
            Ok(receivers) => {
                tracing::debug!("{} published to {} receiver(s)", self.identity, receivers)
            }
            Err(_) => tracing::debug!("{} published with no linked receivers", self.identity),
        }
        Ok(())
    }

    async fn link(&self, peer: &str) -> Result<PublicationReceiver> {
        self.ensure_running()?;
        if peer.is_empty() {
            return Err(BusError::LinkFailed {
                peer: peer.to_string(),
                reason: "empty peer identity".to_string(),
            });
        }
        tracing::debug!("{} linked to {}", self.identity, peer);
        Ok(self.bus.topic(peer).subscribe())
    }

    fn set_presence(&self, presence: Presence) -> Result<()> {
        self.bus.presence.insert(self.identity.clone(), presence);
        Ok(())
    }
}
