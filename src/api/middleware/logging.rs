//! Request logging middleware

use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info};

/// Log method, path, status and latency for every API call
pub async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    debug!("{} {} - started", method, path);

    let response = next.run(req).await;

    info!(
        "{} {} - {} in {:?}",
        method,
        path,
        response.status(),
        start.elapsed()
    );

    response
}
