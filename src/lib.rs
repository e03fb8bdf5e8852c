//! Relay - Proxy Pool Forwarding Service
//!
//! Forwards outbound HTTP requests through a rotating pool of proxies.
//!
//! ## Features
//!
//! - Round-robin rotation over healthy proxies
//! - Periodic pool refresh from a static list or an HTTP provider
//! - Concurrent TCP health probing
//! - Bounded per-proxy retries with fallback to a direct connection
//! - Request statistics and alert hooks
//! - Small HTTP API for forwarding and pool inspection

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;

pub use config::Config;
pub use error::{RelayError, Result};
