//! Error types and Axum response conversions.

use crate::auth::sms::SendError;
use crate::files::StorageError;
use crate::storage::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failures raised by the identity engine and the intake pipeline.
///
/// Authentication variants deliberately conflate their causes so callers
/// cannot tell which factor was wrong.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Identity already exists")]
    DuplicateIdentity,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Identity not found")]
    IdentityNotFound,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Upstream send failure: {0}")]
    UpstreamSendFailure(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ServiceError::NotFound(key),
            other => ServiceError::StorageFailure(other.to_string()),
        }
    }
}

impl From<SendError> for ServiceError {
    fn from(err: SendError) -> Self {
        ServiceError::UpstreamSendFailure(err.to_string())
    }
}

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::DuplicateIdentity => AppError::Conflict("Identity already exists".to_string()),
            // One message for every authentication failure
            ServiceError::InvalidCredentials
            | ServiceError::InvalidCode
            | ServiceError::InvalidToken
            | ServiceError::IdentityNotFound => {
                AppError::Unauthorized("Authentication failed".to_string())
            }
            ServiceError::RateLimited => AppError::RateLimited,
            ServiceError::NotFound(_) => AppError::NotFound("Resource not found".to_string()),
            ServiceError::StorageFailure(msg) => AppError::Internal(format!("Storage: {}", msg)),
            ServiceError::UpstreamSendFailure(msg) => {
                AppError::Internal(format!("SMS send: {}", msg))
            }
            ServiceError::Store(e) => AppError::Internal(format!("Store: {}", e)),
            ServiceError::InvalidInput(msg) => AppError::BadRequest(msg),
            ServiceError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("Invalid JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    /// Extract status code and JSON body from an AppError response.
    async fn error_response(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_internal_hides_details() {
        let (status, body) = error_response(AppError::Internal(
            "Redis connection refused at 10.0.0.5:6379".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(!body["error"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_auth_failures_share_one_message() {
        for err in [
            ServiceError::InvalidCredentials,
            ServiceError::InvalidCode,
            ServiceError::InvalidToken,
            ServiceError::IdentityNotFound,
        ] {
            let (status, body) = error_response(AppError::from(err)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], "Authentication failed");
        }
    }

    #[tokio::test]
    async fn test_duplicate_identity_is_conflict() {
        let (status, _) = error_response(ServiceError::DuplicateIdentity.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let (status, body) = error_response(ServiceError::RateLimited.into()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Rate limit exceeded");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_hidden() {
        let (status, body) = error_response(
            ServiceError::UpstreamSendFailure("provider said isv.BUSINESS_LIMIT".to_string()).into(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let err = ServiceError::from(StorageError::NotFound("abc.pdf".to_string()));
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = ServiceError::from(StorageError::Io(std::io::Error::other("disk full")));
        assert!(matches!(err, ServiceError::StorageFailure(_)));
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        match AppError::from(serde_err) {
            AppError::BadRequest(msg) => assert!(msg.contains("Invalid JSON")),
            _ => panic!("Expected BadRequest variant"),
        }
    }
}
