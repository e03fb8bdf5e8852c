//! Proxy pool and request forwarding
//!
//! This module provides:
//! - A rotating pool of proxy endpoints with health tracking
//! - Periodic refresh from a proxy source and health probing
//! - Request forwarding with bounded retries and direct fallback
//! - Forwarding statistics and alert hooks

pub mod alert;
pub mod forward;
mod guard;
pub mod health;
pub mod pool;
pub mod scheduler;
pub mod source;
pub mod stats;
pub mod transport;

pub use alert::{AlertSink, LogAlertSink, NoopAlertSink};
pub use forward::ForwardingEngine;
pub use health::{HealthProbe, ProbeSummary, TcpProbe};
pub use pool::{PoolCounts, ProxyPool, ProxyPoolConfig};
pub use scheduler::{PoolScheduler, RefreshOutcome, SchedulerHandle};
pub use source::{HttpProxySource, ProxySource, StaticProxySource};
pub use stats::StatsCollector;
pub use transport::{HttpExecutor, ReqwestExecutor, TransportConfig};
