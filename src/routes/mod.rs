//! API route handlers.

pub mod admin;
pub mod auth;
pub mod resource;

use crate::auth::middleware::AppState;
use crate::config::StorageBackend;
use crate::middleware::log_requests;
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        // Auth endpoints
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/auth/send-code", post(auth::send_code))
        .route("/signup/phone", post(auth::signup_phone))
        .route("/login/phone", post(auth::login_phone))
        // Profile endpoints
        .route("/api/me", get(auth::me).patch(auth::update_me))
        // Public resource endpoints
        .route(
            "/api/public/resources",
            post(resource::upload).get(resource::list),
        )
        .route(
            "/api/public/resources/{id}/download",
            get(resource::download),
        )
        // Admin endpoints
        .route("/api/admin/resources/{id}/review", post(admin::review))
        .route("/api/admin/resources/duplicates", get(admin::duplicates))
}

/// Full application: routes, static uploads, and the middleware stack.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    let mut router = api_router();
    if let StorageBackend::Local { upload_dir } = &config.storage {
        router = router.nest_service("/uploads", ServeDir::new(upload_dir));
    }

    // Explicit CORS: deny all cross-origin requests (single-origin deployment).
    let cors = CorsLayer::new();

    router
        .layer(axum::extract::DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn(log_requests))
        .with_state(state)
}
