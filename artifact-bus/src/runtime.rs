//! The capability interface artifacts are written against.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

/// Availability advertised by an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    Available,
    Unavailable,
}

/// A payload published by an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Identity of the publishing artifact
    pub publisher: String,
    /// The published text
    pub payload: String,
}

/// Receiving side of a link to a peer.
pub type PublicationReceiver = broadcast::Receiver<Publication>;

/// Capabilities an artifact needs from the agent platform.
///
/// Implementations handle HOW publications are delivered. Artifacts only see
/// this interface.
#[async_trait]
pub trait ArtifactRuntime: Send + Sync {
    /// The identity (JID-like address) of this artifact.
    fn identity(&self) -> &str;

    /// Connect the artifact to the platform.
    async fn start(&self) -> Result<()>;

    /// Disconnect the artifact and mark it unavailable.
    ///
    /// Publishing and linking fail until the next `start`. Peers already linked
    /// to this artifact keep their receivers; they simply get nothing new.
    async fn stop(&self) -> Result<()>;

    /// Publish a text payload to every linked peer.
    async fn publish(&self, payload: String) -> Result<()>;

    /// Link to a peer artifact and receive what it publishes from now on.
    async fn link(&self, peer: &str) -> Result<PublicationReceiver>;

    /// Advertise availability.
    fn set_presence(&self, presence: Presence) -> Result<()>;
}
