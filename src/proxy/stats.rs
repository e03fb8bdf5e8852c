//! Request counters

use std::sync::atomic::{AtomicU64, Ordering};

use super::pool::ProxyPool;
use crate::models::Stats;

/// Monotonic forwarding counters, safe to bump from any task
#[derive(Debug, Default)]
pub struct StatsCollector {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    direct: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_direct(&self) {
        self.direct.fetch_add(1, Ordering::Relaxed);
    }

    /// Counters plus proxy counts read from the pool right now
    pub fn snapshot(&self, pool: &ProxyPool) -> Stats {
        let counts = pool.counts();
        Stats {
            total_proxies: counts.total,
            healthy_proxies: counts.healthy,
            unhealthy_proxies: counts.unhealthy(),
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            direct_requests: self.direct.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EndpointDescriptor, EndpointKey};
    use crate::proxy::pool::ProxyPoolConfig;
    use std::sync::Arc;

    #[test]
    fn test_snapshot_reads_pool_live() {
        let pool = ProxyPool::new(ProxyPoolConfig::default());
        let stats = StatsCollector::new();

        assert_eq!(stats.snapshot(&pool), Stats::default());

        pool.refresh(vec![
            EndpointDescriptor {
                host: "a".into(),
                port: "1".into(),
                ..Default::default()
            },
            EndpointDescriptor {
                host: "b".into(),
                port: "1".into(),
                ..Default::default()
            },
        ])
        .unwrap();
        let a = pool.get(&EndpointKey::new("a", 1)).unwrap();
        pool.mark_unhealthy(&a);

        let snapshot = stats.snapshot(&pool);
        assert_eq!(snapshot.total_proxies, 2);
        assert_eq!(snapshot.healthy_proxies, 1);
        assert_eq!(snapshot.unhealthy_proxies, 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let stats = Arc::new(StatsCollector::new());
        let pool = ProxyPool::new(ProxyPoolConfig::default());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        stats.record_total();
                        stats.record_success();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        stats.record_direct();
        stats.record_failure();

        let snapshot = stats.snapshot(&pool);
        assert_eq!(snapshot.total_requests, 800);
        assert_eq!(snapshot.successful_requests, 800);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.direct_requests, 1);
    }
}
