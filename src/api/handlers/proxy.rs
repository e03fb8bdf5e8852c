//! Forwarding and pool handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

use crate::api::server::AppState;
use crate::error::RelayError;
use crate::models::{EndpointView, RequestSpec};

/// Forward a request; the HTTP status mirrors the forwarded response
pub async fn forward(
    State(state): State<AppState>,
    Json(request): Json<RequestSpec>,
) -> impl IntoResponse {
    let response = state.engine.forward(request).await;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(response))
}

/// Currently healthy endpoints
pub async fn healthy_proxies(State(state): State<AppState>) -> impl IntoResponse {
    let healthy: Vec<EndpointView> = state
        .engine
        .pool()
        .healthy_snapshot()
        .iter()
        .map(|endpoint| endpoint.view())
        .collect();
    Json(healthy)
}

/// Every endpoint in the pool with its health state
pub async fn list_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints: Vec<EndpointView> = state
        .engine
        .pool()
        .snapshot()
        .iter()
        .map(|endpoint| endpoint.view())
        .collect();
    Json(endpoints)
}

/// Forwarding counters and pool counts
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.stats())
}

/// Refresh the pool from its source now
pub async fn refresh(State(state): State<AppState>) -> Result<impl IntoResponse, RelayError> {
    let outcome = state.scheduler.refresh_from_source().await?;
    info!("Manual proxy refresh: {:?}", outcome);
    Ok(Json(outcome))
}

/// Run a health check pass now
pub async fn check_health(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.engine.pool().probe_health().await;
    info!("Manual health check: {:?}", summary);
    Json(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::ApiServer;
    use crate::config::ForwardConfig;
    use crate::models::{ResponseSpec, Stats};
    use crate::proxy::{
        ForwardingEngine, PoolScheduler, ProxyPool, ProxyPoolConfig, ReqwestExecutor,
        StaticProxySource, TransportConfig,
    };
    use axum::routing::get;
    use axum::Router;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    async fn spawn_upstream() -> SocketAddr {
        serve(Router::new().route(
            "/teapot",
            get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        ))
        .await
    }

    /// API over an empty pool whose source lists `proxies`
    async fn spawn_api(proxies: &[String]) -> (SocketAddr, Arc<ProxyPool>) {
        let pool = Arc::new(ProxyPool::new(ProxyPoolConfig {
            health_check_timeout: Duration::from_secs(1),
            health_check_workers: 4,
        }));
        let executor = ReqwestExecutor::new(TransportConfig {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(5),
        })
        .unwrap();
        let engine = Arc::new(ForwardingEngine::new(
            pool.clone(),
            Arc::new(executor),
            ForwardConfig::default(),
        ));
        let source = Arc::new(StaticProxySource::from_addrs(proxies).unwrap());
        let scheduler = Arc::new(PoolScheduler::new(
            pool.clone(),
            source,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        ));

        let state = AppState::new(engine, scheduler);
        let addr = serve(ApiServer::build_router(state)).await;
        (addr, pool)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (api, _) = spawn_api(&[]).await;

        let body: Value = reqwest::get(format!("http://{}/health", api))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "relay");
    }

    #[tokio::test]
    async fn test_forward_mirrors_upstream_status() {
        let upstream = spawn_upstream().await;
        let (api, _) = spawn_api(&[]).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/api/proxy/forward", api))
            .json(&json!({"method": "GET", "url": format!("http://{}/teapot", upstream)}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 418);
        let body: ResponseSpec = response.json().await.unwrap();
        assert_eq!(body.status, 418);
        assert_eq!(body.body, "short and stout");
        assert!(body.used_direct);
        assert!(body.proxy_used.is_none());

        let stats: Stats = reqwest::get(format!("http://{}/api/proxy/stats", api))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.direct_requests, 1);
        assert_eq!(stats.total_proxies, 0);
    }

    #[tokio::test]
    async fn test_forward_rejects_bad_request() {
        let (api, _) = spawn_api(&[]).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/api/proxy/forward", api))
            .json(&json!({"method": "GET", "url": "not a url"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_refresh_then_check_health() {
        // One live listener and one closed port
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_addr = live.local_addr().unwrap();
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let (api, pool) = spawn_api(&[live_addr.to_string(), dead_addr.to_string()]).await;
        let client = reqwest::Client::new();

        let refreshed: Value = client
            .post(format!("http://{}/api/proxy/refresh", api))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(refreshed, json!({"outcome": "refreshed", "total": 2}));
        assert_eq!(pool.len(), 2);

        let summary: Value = client
            .post(format!("http://{}/api/proxy/check-health", api))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(summary["checked"], 2);
        assert_eq!(summary["healthy"], 1);
        assert_eq!(summary["unhealthy"], 1);

        let healthy: Vec<EndpointView> =
            reqwest::get(format!("http://{}/api/proxy/healthy", api))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].port, live_addr.port());

        let all: Vec<EndpointView> = reqwest::get(format!("http://{}/api/proxy/endpoints", api))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|e| !e.healthy && e.consecutive_failures == 1));
    }
}
