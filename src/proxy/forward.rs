//! Forwarding engine with proxy rotation and direct fallback
//!
//! A request is tried through up to `max_proxy_attempts` distinct healthy
//! proxies, each with a budget of `max_retries_per_proxy` connectivity
//! failures. If no proxy produces a response the request is sent once over
//! a direct connection. Only a [`ResponseSpec`] leaves this module.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::alert::{AlertSink, NoopAlertSink};
use super::pool::ProxyPool;
use super::stats::StatsCollector;
use super::transport::{validate_request, HttpExecutor};
use crate::config::ForwardConfig;
use crate::models::{EndpointKey, Header, ProxyEndpoint, RequestSpec, ResponseSpec, Stats};

/// Forwards requests through the pool
pub struct ForwardingEngine {
    pool: Arc<ProxyPool>,
    executor: Arc<dyn HttpExecutor>,
    alerts: Arc<dyn AlertSink>,
    stats: StatsCollector,
    config: ForwardConfig,
}

impl ForwardingEngine {
    pub fn new(pool: Arc<ProxyPool>, executor: Arc<dyn HttpExecutor>, config: ForwardConfig) -> Self {
        Self::with_alerts(pool, executor, Arc::new(NoopAlertSink), config)
    }

    pub fn with_alerts(
        pool: Arc<ProxyPool>,
        executor: Arc<dyn HttpExecutor>,
        alerts: Arc<dyn AlertSink>,
        config: ForwardConfig,
    ) -> Self {
        Self {
            pool,
            executor,
            alerts,
            stats: StatsCollector::new(),
            config,
        }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Counters combined with live pool counts
    pub fn stats(&self) -> Stats {
        self.stats.snapshot(&self.pool)
    }

    /// Forward a request, always producing a response
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn forward(&self, request: RequestSpec) -> ResponseSpec {
        self.stats.record_total();
        info!("Forwarding request to {}", request.url);

        if let Err(e) = validate_request(&request) {
            warn!("Rejecting request: {}", e);
            self.stats.record_failure();
            return ResponseSpec::synthetic(400, e.to_string());
        }
        let request = self.with_default_content_type(request);

        if self.pool.healthy_count() == 0 {
            warn!("No healthy proxies, using direct connection");
        } else if let Some(response) = self.try_proxies(&request).await {
            self.stats.record_success();
            return response;
        } else {
            warn!("All proxy attempts failed, falling back to direct connection");
        }

        self.alerts.fallback_to_direct(&request.url);
        self.forward_direct(&request).await
    }

    /// Rotate through healthy proxies until one yields a response
    async fn try_proxies(&self, request: &RequestSpec) -> Option<ResponseSpec> {
        let mut tried = HashSet::new();

        for attempt in 1..=self.config.max_proxy_attempts {
            // The pool is only consulted here; no lock is held across the I/O below.
            let Some(proxy) = self.next_untried(&tried) else {
                warn!("No healthy proxies left to try");
                break;
            };
            tried.insert(proxy.key().clone());

            debug!(
                "Attempting request through proxy {} (attempt {}/{})",
                proxy.key(),
                attempt,
                self.config.max_proxy_attempts
            );

            if let Some(response) = self.try_proxy(request, &proxy).await {
                info!("Request succeeded through proxy {}", proxy.key());
                return Some(response);
            }

            warn!(
                "Proxy attempt {}/{} through {} failed, moving to next proxy",
                attempt,
                self.config.max_proxy_attempts,
                proxy.key()
            );
        }

        None
    }

    /// Next healthy proxy not yet tried for this request
    ///
    /// A proxy that failed without a transport fault stays healthy, so the
    /// rotation may hand it back; at most one lap of the healthy set is walked.
    fn next_untried(&self, tried: &HashSet<EndpointKey>) -> Option<Arc<ProxyEndpoint>> {
        let lap = self.pool.healthy_count();
        (0..lap)
            .filter_map(|_| self.pool.next_healthy())
            .find(|proxy| !tried.contains(proxy.key()))
    }

    /// Spend the retry budget on a single proxy
    async fn try_proxy(&self, request: &RequestSpec, proxy: &ProxyEndpoint) -> Option<ResponseSpec> {
        let budget = self.config.max_retries_per_proxy;

        for retry in 1..=budget {
            match self.executor.execute(request, Some(proxy)).await {
                Ok(exchange) => {
                    return Some(ResponseSpec::via_proxy(exchange, proxy.key().clone()));
                }
                Err(e) => {
                    warn!(
                        "Request through {} failed (attempt {}/{}): {}",
                        proxy.key(),
                        retry,
                        budget,
                        e
                    );
                    if !e.is_connectivity() {
                        // Not a transport fault, so the proxy keeps its health.
                        return None;
                    }
                }
            }
        }

        self.pool.mark_unhealthy(proxy);
        None
    }

    /// Single direct attempt; a transport failure here ends the request
    async fn forward_direct(&self, request: &RequestSpec) -> ResponseSpec {
        match self.executor.execute(request, None).await {
            Ok(exchange) => {
                self.stats.record_direct();
                self.stats.record_success();
                ResponseSpec::direct(exchange)
            }
            Err(e) => {
                error!("Direct request to {} failed: {}", request.url, e);
                self.stats.record_failure();
                ResponseSpec::synthetic(
                    500,
                    format!("Failed to forward request after all attempts: {}", e),
                )
            }
        }
    }

    fn with_default_content_type(&self, mut request: RequestSpec) -> RequestSpec {
        if let Some(content_type) = &self.config.default_content_type {
            if !request.has_header("content-type") {
                request
                    .headers
                    .push(Header::new("Content-Type", content_type.clone()));
            }
        }
        request
    }
}
