//! API route definitions

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/proxy", proxy_routes())
        .with_state(state)
}

fn proxy_routes() -> Router<AppState> {
    Router::new()
        .route("/forward", post(handlers::proxy::forward))
        .route("/healthy", get(handlers::proxy::healthy_proxies))
        .route("/endpoints", get(handlers::proxy::list_endpoints))
        .route("/stats", get(handlers::proxy::stats))
        .route("/refresh", post(handlers::proxy::refresh))
        .route("/check-health", post(handlers::proxy::check_health))
}
