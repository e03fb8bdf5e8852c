//! Proxy pool
//!
//! Holds the current endpoint list as an immutable snapshot behind an
//! [`ArcSwap`]. Refresh builds a new list and swaps the reference, so
//! readers never block and never see a half-built list. Health lives inside
//! each endpoint and is the only thing mutated in place.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{info, instrument, warn};

use super::alert::{AlertSink, NoopAlertSink};
use super::guard::InFlightGuard;
use super::health::{probe_endpoints, HealthProbe, ProbeSummary, TcpProbe};
use crate::error::Result;
use crate::models::{EndpointDescriptor, EndpointKey, ProxyEndpoint};

/// Pool settings
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Connect timeout for a single probe
    pub health_check_timeout: Duration,
    /// Maximum number of probes in flight at once
    pub health_check_workers: usize,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            health_check_timeout: Duration::from_secs(10),
            health_check_workers: 16,
        }
    }
}

impl From<&crate::config::PoolConfig> for ProxyPoolConfig {
    fn from(config: &crate::config::PoolConfig) -> Self {
        Self {
            health_check_timeout: config.health_check_timeout,
            health_check_workers: config.health_check_workers,
        }
    }
}

/// Endpoint counts at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCounts {
    pub total: usize,
    pub healthy: usize,
}

impl PoolCounts {
    pub fn unhealthy(&self) -> usize {
        self.total.saturating_sub(self.healthy)
    }
}

/// Rotating pool of proxy endpoints with health tracking
pub struct ProxyPool {
    endpoints: ArcSwap<Vec<Arc<ProxyEndpoint>>>,
    cursor: AtomicUsize,
    probing: AtomicBool,
    config: ProxyPoolConfig,
    probe: Arc<dyn HealthProbe>,
    alerts: Arc<dyn AlertSink>,
}

impl ProxyPool {
    pub fn new(config: ProxyPoolConfig) -> Self {
        Self::with_parts(config, Arc::new(TcpProbe), Arc::new(NoopAlertSink))
    }

    pub fn with_parts(
        config: ProxyPoolConfig,
        probe: Arc<dyn HealthProbe>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            endpoints: ArcSwap::from_pointee(Vec::new()),
            cursor: AtomicUsize::new(0),
            probing: AtomicBool::new(false),
            config,
            probe,
            alerts,
        }
    }

    /// Replace the endpoint list, sharing health with endpoints that survive
    ///
    /// Every descriptor is validated before anything changes; one malformed
    /// entry rejects the whole batch and leaves the current pool in place.
    /// Duplicate `(host, port)` pairs keep their first occurrence.
    pub fn refresh(&self, descriptors: Vec<EndpointDescriptor>) -> Result<usize> {
        let incoming = descriptors
            .into_iter()
            .map(ProxyEndpoint::try_from)
            .collect::<Result<Vec<_>>>()?;

        let current = self.endpoints.load();
        let existing: HashMap<&EndpointKey, &Arc<ProxyEndpoint>> =
            current.iter().map(|e| (e.key(), e)).collect();

        let mut seen = HashSet::with_capacity(incoming.len());
        let mut carried = 0usize;
        let mut next = Vec::with_capacity(incoming.len());

        for endpoint in incoming {
            if !seen.insert(endpoint.key().clone()) {
                continue;
            }

            let endpoint = match existing.get(endpoint.key()) {
                Some(old) => {
                    carried += 1;
                    // Probes and forwards may still hold the old endpoint;
                    // sharing the cell keeps their writes.
                    let key = endpoint.key().clone();
                    let metadata = endpoint.metadata().clone();
                    ProxyEndpoint::with_shared_health(key, metadata, old)
                }
                None => endpoint,
            };
            next.push(Arc::new(endpoint));
        }

        let total = next.len();
        info!(
            "Refreshed proxy pool: {} endpoints ({} carried over, {} dropped)",
            total,
            carried,
            current.len().saturating_sub(carried)
        );

        self.endpoints.store(Arc::new(next));
        Ok(total)
    }

    /// Probe every endpoint once and record the results
    ///
    /// Returns a skipped summary if another pass is already running.
    #[instrument(skip(self))]
    pub async fn probe_health(&self) -> ProbeSummary {
        let Some(_guard) = InFlightGuard::try_acquire(&self.probing) else {
            warn!("Health check already in progress, skipping");
            return ProbeSummary::skipped();
        };

        let endpoints = self.endpoints.load_full();
        if endpoints.is_empty() {
            warn!("No proxies available for health check");
            return ProbeSummary::default();
        }

        info!("Starting health check for {} proxies", endpoints.len());

        let summary = probe_endpoints(
            self.probe.as_ref(),
            &endpoints,
            self.config.health_check_timeout,
            self.config.health_check_workers,
        )
        .await;

        info!(
            "Health check complete: {} healthy, {} unhealthy",
            summary.healthy, summary.unhealthy
        );

        if summary.healthy == 0 {
            self.alerts.no_healthy_proxies();
        }

        summary
    }

    /// Next healthy endpoint in round-robin order
    ///
    /// The healthy subset is recomputed on every call and the cursor is
    /// reduced modulo its current size, so a subset that shrinks or grows
    /// between calls never yields an out-of-range index.
    pub fn next_healthy(&self) -> Option<Arc<ProxyEndpoint>> {
        let healthy = self.healthy_snapshot();
        let len = healthy.len();
        if len == 0 {
            return None;
        }

        // The closure always returns Some, so both arms carry the previous value.
        let previous = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i % len + 1) % len))
        {
            Ok(prev) | Err(prev) => prev,
        };

        healthy.get(previous % len).cloned()
    }

    /// Take an endpoint out of rotation until its next successful probe
    pub fn mark_unhealthy(&self, endpoint: &ProxyEndpoint) {
        endpoint.force_unhealthy();
        info!("Marked proxy {} as unhealthy", endpoint.key());
    }

    /// Currently healthy endpoints
    pub fn healthy_snapshot(&self) -> Vec<Arc<ProxyEndpoint>> {
        self.endpoints
            .load()
            .iter()
            .filter(|e| e.is_healthy())
            .cloned()
            .collect()
    }

    /// Every endpoint in the current snapshot
    pub fn snapshot(&self) -> Arc<Vec<Arc<ProxyEndpoint>>> {
        self.endpoints.load_full()
    }

    /// Look up an endpoint in the current snapshot
    pub fn get(&self, key: &EndpointKey) -> Option<Arc<ProxyEndpoint>> {
        self.endpoints.load().iter().find(|e| e.key() == key).cloned()
    }

    pub fn len(&self) -> usize {
        self.endpoints.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn healthy_count(&self) -> usize {
        self.endpoints.load().iter().filter(|e| e.is_healthy()).count()
    }

    /// Total and healthy counts read from the same snapshot
    pub fn counts(&self) -> PoolCounts {
        let endpoints = self.endpoints.load();
        PoolCounts {
            total: endpoints.len(),
            healthy: endpoints.iter().filter(|e| e.is_healthy()).count(),
        }
    }
}
