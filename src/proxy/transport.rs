//! Outbound HTTP execution
//!
//! Executes one HTTP exchange either through a proxy endpoint or directly.
//! A response that arrives over the wire is always returned as an
//! [`Exchange`], whatever its status; only transport faults become errors.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, RelayError};
use crate::models::{EndpointKey, Exchange, Header, ProxyEndpoint, RequestSpec};

/// Executes a single HTTP exchange
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Send `request` through `via`, or directly when `via` is `None`
    ///
    /// Errors are [`RelayError::Connectivity`] for transport faults.
    async fn execute(&self, request: &RequestSpec, via: Option<&ProxyEndpoint>)
        -> Result<Exchange>;
}

/// Timeouts applied to every outbound connection
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Check that a request can be put on the wire at all
///
/// Failures here are the caller's fault and must never count against a proxy.
pub fn validate_request(request: &RequestSpec) -> Result<()> {
    parse_method(&request.method)?;

    let url = Url::parse(&request.url)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RelayError::InvalidRequest(format!(
            "unsupported URL scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(RelayError::InvalidRequest("URL must include a host".into()));
    }

    for header in &request.headers {
        HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| {
            RelayError::InvalidRequest(format!("invalid header name: {:?}", header.name))
        })?;
        HeaderValue::from_str(&header.value).map_err(|_| {
            RelayError::InvalidRequest(format!("invalid value for header {}", header.name))
        })?;
    }

    Ok(())
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| RelayError::InvalidRequest(format!("invalid HTTP method: {:?}", method)))
}

/// [`HttpExecutor`] backed by `reqwest`
///
/// One client is kept for direct traffic and one per proxy endpoint, so
/// connections to the same proxy are pooled across requests.
pub struct ReqwestExecutor {
    config: TransportConfig,
    direct: Client,
    // TODO: drop clients of endpoints that a refresh removed from the pool
    proxied: DashMap<EndpointKey, Client>,
}

impl ReqwestExecutor {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let direct = Self::builder(&config)
            .no_proxy()
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            direct,
            proxied: DashMap::new(),
        })
    }

    fn builder(config: &TransportConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
    }

    fn client_for(&self, via: Option<&ProxyEndpoint>) -> Result<Client> {
        let Some(endpoint) = via else {
            return Ok(self.direct.clone());
        };

        if let Some(client) = self.proxied.get(endpoint.key()) {
            return Ok(client.clone());
        }

        let proxy_url = format!("http://{}", endpoint.key());
        let proxy = reqwest::Proxy::all(&proxy_url).map_err(|e| {
            RelayError::InvalidEndpoint(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        let client = Self::builder(&self.config)
            .proxy(proxy)
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        self.proxied
            .insert(endpoint.key().clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    #[instrument(skip(self, request, via), fields(method = %request.method, url = %request.url))]
    async fn execute(
        &self,
        request: &RequestSpec,
        via: Option<&ProxyEndpoint>,
    ) -> Result<Exchange> {
        let method = parse_method(&request.method)?;
        let client = self.client_for(via)?;

        let mut builder = client.request(method, &request.url);
        for header in &request.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                Header::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
            })
            .collect();
        let body = response.text().await?;

        let route = via
            .map(|e| e.key().to_string())
            .unwrap_or_else(|| "direct".to_string());
        debug!(status, route = %route, "Exchange complete");

        Ok(Exchange {
            status,
            headers,
            body,
        })
    }
}
