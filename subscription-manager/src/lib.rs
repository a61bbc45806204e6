//! Subscription lifecycle management for NGSI-LD context brokers.
//!
//! [`SubscriptionManagerArtifact`] keeps one broker subscription in place while it
//! runs and relays every notification to the peers linked to it:
//!
//! - [`registry`]: local identifiers and the broker ids they map to
//! - [`ownership`]: the `Artifact-ID: .., Sub-ID: ..` tag that marks our subscriptions
//! - [`reconciler`]: discover, delete, match, then create or update
//! - [`notification`]: attribute filtering and republishing of notifications
//! - [`artifact`]: the run sequence tying it all together
//!
//! Broker failures degrade and are logged. Only a listener that cannot bind, a
//! messaging runtime that cannot start, or bad settings make a run fail.

pub mod artifact;
pub mod config;
pub mod error;
pub mod notification;
pub mod ownership;
pub mod reconciler;
pub mod registry;

pub use artifact::{ListenerEndpoint, SubscriptionManagerArtifact};
pub use config::{ManagerSettings, SubscriptionConfig};
pub use error::{ManagerError, Result};
pub use notification::{NotificationOutcome, NotificationRecord, NotificationRouter, ACKNOWLEDGEMENT};
pub use ownership::OwnershipTag;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use registry::{ActiveSubscriptionRegistry, SubscriptionIdentifier, IDENTIFIER_PREFIX};
