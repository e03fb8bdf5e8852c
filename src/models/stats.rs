use serde::{Deserialize, Serialize};

/// Forwarding statistics combined with live pool counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Stats {
    /// Endpoints currently in the pool
    pub total_proxies: usize,
    /// Endpoints currently healthy
    pub healthy_proxies: usize,
    /// Endpoints currently unhealthy
    pub unhealthy_proxies: usize,
    /// Forward calls received
    pub total_requests: u64,
    /// Forward calls that returned a received response
    pub successful_requests: u64,
    /// Forward calls that ended in a synthetic error response
    pub failed_requests: u64,
    /// Forward calls answered over a direct connection
    pub direct_requests: u64,
}
