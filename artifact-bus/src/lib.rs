//! Messaging capability interface for FIWARE artifacts.
//!
//! Artifacts never talk to the agent platform directly. They consume the small
//! [`ArtifactRuntime`] capability set instead:
//!
//! - `start` / `stop` the artifact's connection
//! - `publish` a text payload to everyone linked to this artifact
//! - `link` to a peer artifact and receive its publications
//! - `set_presence` to advertise availability
//!
//! [`InProcessBus`] implements the interface with Tokio broadcast channels, which is
//! what the command-line binary and the test suites use.
//!
//! # Example
//!
//! ```
//! use artifact_bus::{ArtifactRuntime, InProcessBus, Presence};
//!
//! # #[tokio::main]
//! # async fn main() -> artifact_bus::Result<()> {
//! let bus = InProcessBus::new();
//! let artifact = bus.handle("subscriber@localhost");
//! let agent = bus.handle("agent@localhost");
//!
//! artifact.start().await?;
//! agent.start().await?;
//! artifact.set_presence(Presence::Available)?;
//!
//! let mut publications = agent.link("subscriber@localhost").await?;
//! artifact.publish("{\"hello\":\"world\"}".to_string()).await?;
//!
//! let publication = publications.recv().await.unwrap();
//! assert_eq!(publication.publisher, "subscriber@localhost");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod in_process;
pub mod runtime;

pub use error::{BusError, Result};
pub use in_process::{BusHandle, InProcessBus};
pub use runtime::{ArtifactRuntime, Presence, Publication, PublicationReceiver};
