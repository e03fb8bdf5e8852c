//! API server using Axum

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ApiServerConfig;
use crate::error::{RelayError, Result};
use crate::proxy::{ForwardingEngine, PoolScheduler};

use super::middleware::log_request;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ForwardingEngine>,
    pub scheduler: Arc<PoolScheduler>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<ForwardingEngine>, scheduler: Arc<PoolScheduler>) -> Self {
        Self {
            engine,
            scheduler,
            started_at: Instant::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router with tracing and request logging
    pub fn build_router(state: AppState) -> Router {
        routes::create_router(state)
            .layer(axum::middleware::from_fn(log_request))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` fires
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| {
                RelayError::InvalidConfig(format!(
                    "Invalid API address {}:{}: {}",
                    self.config.host, self.config.port, e
                ))
            })?;

        let router = Self::build_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| RelayError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
