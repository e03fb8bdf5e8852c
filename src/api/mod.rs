//! API server implementation
//!
//! Exposes request forwarding and pool inspection over HTTP.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
