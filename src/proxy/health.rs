//! Liveness probing for proxy endpoints
//!
//! A probe is a plain TCP connect to the endpoint. Results flip the
//! endpoint's health flag directly; there is no failure threshold, so an
//! endpoint with intermittent connectivity flaps between states from one
//! pass to the next.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::error::{Result, RelayError};
use crate::models::ProxyEndpoint;

/// Checks whether an endpoint accepts connections
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, endpoint: &ProxyEndpoint, timeout: Duration) -> Result<()>;
}

/// Probe that opens and immediately drops a TCP connection
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait]
impl HealthProbe for TcpProbe {
    #[instrument(skip(self, endpoint), fields(proxy = %endpoint.key()))]
    async fn check(&self, endpoint: &ProxyEndpoint, check_timeout: Duration) -> Result<()> {
        let addr = (endpoint.host(), endpoint.port());
        match timeout(check_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(RelayError::Connectivity(format!("connect failed: {}", e))),
            Err(_) => Err(RelayError::Connectivity("connect timed out".to_string())),
        }
    }
}

/// Outcome of one probe pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProbeSummary {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Set when the pass did not run because another one was in progress
    pub skipped: bool,
}

impl ProbeSummary {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Probe every endpoint with at most `workers` checks in flight and record results
pub async fn probe_endpoints(
    probe: &dyn HealthProbe,
    endpoints: &[Arc<ProxyEndpoint>],
    check_timeout: Duration,
    workers: usize,
) -> ProbeSummary {
    let results = futures::stream::iter(endpoints.iter().cloned())
        .map(|endpoint| async move {
            let reachable = match probe.check(&endpoint, check_timeout).await {
                Ok(()) => {
                    debug!("Proxy {} is healthy", endpoint.key());
                    true
                }
                Err(e) => {
                    debug!("Proxy {} is unhealthy: {}", endpoint.key(), e);
                    false
                }
            };
            endpoint.record_probe(reachable);
            reachable
        })
        .buffer_unordered(workers.max(1))
        .collect::<Vec<bool>>()
        .await;

    let healthy = results.iter().filter(|&&v| v).count();
    ProbeSummary {
        checked: results.len(),
        healthy,
        unhealthy: results.len().saturating_sub(healthy),
        skipped: false,
    }
}
