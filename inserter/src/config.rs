//! Configuration types for the inserter

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{InserterError, Result};

/// What the inserter listens to and how it shapes entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InserterConfig {
    /// Identity of the artifact whose publications are inserted
    pub publisher: String,

    /// Entity template with `{key}` placeholders filled from each payload
    pub json_template: Map<String, Value>,

    /// Attribute name to payload key. The attribute's `value` is taken verbatim
    /// from that key.
    pub json_exceptions: HashMap<String, String>,

    /// Drop attributes whose value resolved to null
    pub clean: bool,
}

impl Default for InserterConfig {
    fn default() -> Self {
        Self {
            publisher: String::new(),
            json_template: Map::new(),
            json_exceptions: HashMap::new(),
            clean: true,
        }
    }
}

impl InserterConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| InserterError::Configuration(format!("Invalid inserter config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.publisher.trim().is_empty() {
            return Err(InserterError::Configuration(
                "Publisher identity must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runtime settings for the inserter
#[derive(Debug, Clone)]
pub struct InserterSettings {
    /// Base URL of the context broker
    /// Default: http://localhost:9090
    pub broker_url: String,

    /// Per-request timeout for broker calls
    /// Default: none, transport defaults apply
    pub request_timeout: Option<Duration>,
}

impl Default for InserterSettings {
    fn default() -> Self {
        Self {
            broker_url: "http://localhost:9090".to_string(),
            request_timeout: None,
        }
    }
}

impl InserterSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker_url.trim().is_empty() {
            return Err(InserterError::Configuration(
                "Broker URL must not be empty".to_string(),
            ));
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err(InserterError::Configuration(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_broker_url(mut self, broker_url: impl Into<String>) -> Self {
        self.broker_url = broker_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
