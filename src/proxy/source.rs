//! Proxy list sources
//!
//! A source supplies the raw endpoint list the pool is refreshed from.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, RelayError};
use crate::models::{EndpointDescriptor, EndpointKey};

/// Supplies candidate proxy endpoints
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Fetch the current endpoint list, in provider order
    async fn fetch(&self) -> Result<Vec<EndpointDescriptor>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Fixed endpoint list
#[derive(Debug, Clone, Default)]
pub struct StaticProxySource {
    descriptors: Vec<EndpointDescriptor>,
}

impl StaticProxySource {
    pub fn new(descriptors: Vec<EndpointDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Build from `host:port` strings, rejecting malformed entries
    pub fn from_addrs<S: AsRef<str>>(addrs: &[S]) -> Result<Self> {
        let descriptors = addrs
            .iter()
            .map(|addr| {
                let key = EndpointKey::parse(addr.as_ref())?;
                Ok(EndpointDescriptor {
                    host: key.host,
                    port: key.port.to_string(),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(descriptors))
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    async fn fetch(&self) -> Result<Vec<EndpointDescriptor>> {
        Ok(self.descriptors.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Provider response envelope: `{"data": [...]}`
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    data: Vec<EndpointDescriptor>,
}

/// Fetches the endpoint list from a provider over HTTP
pub struct HttpProxySource {
    client: Client,
    url: Url,
}

impl HttpProxySource {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ProxySource for HttpProxySource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<EndpointDescriptor>> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| RelayError::SourceFetch(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::SourceFetch(format!(
                "provider returned status {}",
                status
            )));
        }

        let body: ProviderResponse = response
            .json()
            .await
            .map_err(|e| RelayError::SourceFetch(format!("invalid provider response: {}", e)))?;

        debug!("Received {} proxies from provider", body.data.len());
        Ok(body.data)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
