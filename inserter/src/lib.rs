//! Inserter artifact for NGSI-LD context brokers.
//!
//! The [`InserterArtifact`] links to a publishing peer, shapes every payload it
//! receives with a JSON entity template, and creates or updates the matching
//! entity on the broker.

pub mod artifact;
pub mod config;
pub mod error;
pub mod template;

pub use artifact::{DataProcessor, InsertOutcome, InserterArtifact};
pub use config::{InserterConfig, InserterSettings};
pub use error::{InserterError, Result};
pub use template::build_entity_json;
