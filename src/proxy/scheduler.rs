//! Periodic pool maintenance
//!
//! Refreshes the pool from its source and probes endpoint health on two
//! independent timers until told to stop.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use super::guard::InFlightGuard;
use super::pool::ProxyPool;
use super::source::ProxySource;
use crate::error::Result;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Result of one refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The pool now holds `total` endpoints
    Refreshed { total: usize },
    /// The source returned nothing; the current pool was kept
    EmptyKept,
    /// Another refresh was already running
    Skipped,
}

/// Drives refresh and health-check cycles for one pool
pub struct PoolScheduler {
    pool: Arc<ProxyPool>,
    source: Arc<dyn ProxySource>,
    fetch_interval: Duration,
    health_interval: Duration,
    refreshing: AtomicBool,
}

impl PoolScheduler {
    pub fn new(
        pool: Arc<ProxyPool>,
        source: Arc<dyn ProxySource>,
        fetch_interval: Duration,
        health_interval: Duration,
    ) -> Self {
        Self {
            pool,
            source,
            fetch_interval,
            health_interval,
            refreshing: AtomicBool::new(false),
        }
    }

    /// Fetch from the source and refresh the pool
    ///
    /// An empty fetch keeps the current pool. A failed fetch or a rejected
    /// batch leaves the pool untouched and returns the error.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn refresh_from_source(&self) -> Result<RefreshOutcome> {
        let Some(_guard) = InFlightGuard::try_acquire(&self.refreshing) else {
            warn!("Proxy refresh already in progress, skipping");
            return Ok(RefreshOutcome::Skipped);
        };

        let descriptors = self.source.fetch().await?;
        if descriptors.is_empty() {
            warn!("Proxy source returned no endpoints, keeping current pool");
            return Ok(RefreshOutcome::EmptyKept);
        }

        let total = self.pool.refresh(descriptors)?;
        Ok(RefreshOutcome::Refreshed { total })
    }

    /// Run until `shutdown` flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting pool scheduler (fetch every {:?}, health check every {:?})",
            self.fetch_interval, self.health_interval
        );

        if let Err(e) = self.refresh_from_source().await {
            error!("Initial proxy refresh failed: {}", e);
        }
        self.pool.probe_health().await;

        let mut fetch_ticker = ticker(self.fetch_interval).await;
        let mut health_ticker = ticker(self.health_interval).await;

        loop {
            tokio::select! {
                _ = fetch_ticker.tick() => {
                    if let Err(e) = self.refresh_from_source().await {
                        error!("Proxy refresh failed: {}", e);
                    }
                }
                _ = health_ticker.tick() => {
                    self.pool.probe_health().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Pool scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }
}

// First tick fires immediately; consume it so the loop waits a full period.
async fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    ticker
}

/// Handle for stopping a running [`PoolScheduler`]
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self::new().0
    }
}
