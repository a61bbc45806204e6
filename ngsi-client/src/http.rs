//! Plumbing shared by the subscription and entity gateways.

use std::time::Duration;

use reqwest::{Client, Response};
use url::Url;

use crate::error::{NgsiError, Result};

/// Base path of the NGSI-LD API.
pub(crate) const API_ROOT: &str = "ngsi-ld/v1";

pub(crate) const LD_JSON: &str = "application/ld+json";
pub(crate) const MERGE_PATCH_JSON: &str = "application/merge-patch+json";

/// A validated broker base URL plus the HTTP client used to reach it.
#[derive(Debug, Clone)]
pub(crate) struct BrokerEndpoint {
    client: Client,
    base: String,
}

impl BrokerEndpoint {
    pub(crate) fn new(broker_url: &str, client: Client) -> Result<Self> {
        let parsed = Url::parse(broker_url).map_err(|e| NgsiError::InvalidBrokerUrl {
            url: broker_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(NgsiError::InvalidBrokerUrl {
                url: broker_url.to_string(),
                reason: "expected an http(s) base URL".to_string(),
            });
        }

        Ok(Self {
            client,
            base: broker_url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn with_timeout(broker_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::new(broker_url, client)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    /// `{base}/ngsi-ld/v1/{path}`. Path segments are inserted verbatim.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base, API_ROOT, path)
    }
}

/// Pass `response` through when its status is one of `expected`, otherwise turn it
/// into [`NgsiError::UnexpectedStatus`] carrying the body text.
pub(crate) async fn expect_status(response: Response, expected: &[u16]) -> Result<Response> {
    let status = response.status().as_u16();
    if expected.contains(&status) {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NgsiError::UnexpectedStatus { status, body })
}
