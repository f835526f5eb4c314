//! Request logging middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Log method, path, status and latency of every request.
///
/// Server errors log at `warn`, everything else at `info`. Query strings
/// are left out so search terms and hashes stay out of the log.
///
/// # Usage
///
/// ```rust,no_run
/// use axum::Router;
/// use axum::middleware;
/// use chirp::middleware::log_requests;
///
/// let app: Router = Router::new()
///     .layer(middleware::from_fn(log_requests));
/// ```
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        tracing::warn!(action = "request", method = %method, path = %path, status, elapsed_ms, "Request failed");
    } else {
        tracing::info!(action = "request", method = %method, path = %path, status, elapsed_ms, "Request handled");
    }

    response
}
