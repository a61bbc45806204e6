//! NGSI-LD context broker gateway.
//!
//! This crate holds everything that speaks the broker's HTTP dialect:
//!
//! - [`entity_id`]: normalization of bare ids into `urn:ngsi-ld:` URNs
//! - [`subscription`]: subscription documents as sent to and listed from the broker
//! - [`gateway`]: subscription CRUD behind the [`SubscriptionBroker`] trait
//! - [`entities`]: entity existence checks, creation and attribute updates
//!
//! Every call has a `try_*` form that returns [`NgsiError`]. The plain forms log the
//! failure and degrade to `None`, `false` or an empty list, which is what the
//! artifacts use since no broker failure is allowed to stop them.
//!
//! # Example
//!
//! ```no_run
//! use ngsi_client::{BrokerGateway, SubscriptionBroker, SubscriptionDocument};
//!
//! # #[tokio::main]
//! # async fn main() -> ngsi_client::Result<()> {
//! let gateway = BrokerGateway::new("http://localhost:1026")?;
//! let document = SubscriptionDocument::new("Room", "http://10.0.0.5:8000/notify")
//!     .with_watched_attributes(vec!["temperature".to_string()]);
//!
//! if let Some(broker_id) = gateway.create(&document).await {
//!     println!("Created {broker_id}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod entities;
pub mod entity_id;
pub mod error;
pub mod gateway;
mod http;
pub mod subscription;

pub use entities::{attribute_fragment, AttributeUpdate, EntityGateway};
pub use entity_id::{format_entity_id, NGSI_LD_PREFIX};
pub use error::{NgsiError, Result};
pub use gateway::{BrokerGateway, SubscriptionBroker};
pub use subscription::{
    BrokerSubscription, ContextRef, Endpoint, EntitySelector, NotificationParams,
    SubscriptionDocument, SubscriptionPatch, NGSI_LD_CORE_CONTEXT,
};
