//! Admin-only moderation endpoints.

use crate::auth::middleware::{AdminSession, AppState};
use crate::error::AppError;
use crate::models::{DuplicateQuery, ResourceStatus, ReviewRequest};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

/// POST /api/admin/resources/{id}/review — Approve or reject a resource
///
/// Only `APPROVED` and `REJECTED` are accepted. A reviewed resource may be
/// reviewed again; the latest outcome wins.
pub async fn review(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Path(id): Path<i64>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let status = req
        .status
        .parse::<ResourceStatus>()
        .ok()
        .filter(ResourceStatus::is_review_outcome)
        .ok_or_else(|| AppError::BadRequest("invalid status".to_string()))?;

    state.catalog.review(id, status).await?;

    tracing::info!(
        action = "admin_review",
        admin_id = session.identity.id,
        resource_id = id,
        status = %status,
        "Review recorded"
    );

    Ok(Json(json!({ "id": id, "status": status })))
}

/// GET /api/admin/resources/duplicates?hash= — Resources sharing a content hash
pub async fn duplicates(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<DuplicateQuery>,
) -> Result<impl IntoResponse, AppError> {
    let hash = query.hash.trim();
    if hash.is_empty() {
        return Err(AppError::BadRequest("hash required".to_string()));
    }

    let resources = state.catalog.check_duplicate(hash).await?;
    Ok(Json(resources))
}
