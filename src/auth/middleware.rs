//! Axum extractors for authentication and the admin role gate.

use crate::auth::engine::AuthService;
use crate::catalog::ResourceService;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{Identity, Role};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub catalog: Arc<ResourceService>,
    pub config: Arc<Config>,
}

/// Authenticated session extractor.
///
/// Resolves `Authorization: Bearer {token}` to an identity and attaches the
/// identity to the request extensions. Returns 401 Unauthorized if the
/// header is missing or the token does not resolve.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub identity: Identity,
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let auth_header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<AuthSession>() {
            return Ok(session.clone());
        }

        let token = bearer_token(parts)?;

        let identity = state
            .auth
            .resolve_token(token)
            .await
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        let session = AuthSession { identity };
        parts.extensions.insert(session.clone());
        Ok(session)
    }
}

/// Optional authenticated session extractor.
///
/// `Option<AuthSession>` is `Some` for a valid bearer token and `None`
/// otherwise. Missing or invalid credentials never fail the request.
impl OptionalFromRequestParts<AppState> for AuthSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <AuthSession as FromRequestParts<AppState>>::from_request_parts(parts, state).await {
            Ok(session) => Ok(Some(session)),
            Err(_) => Ok(None),
        }
    }
}

/// Admin-only session extractor.
///
/// Extracts session and verifies role is Admin.
/// Returns 401 if unauthenticated, 403 Forbidden if not admin.
pub struct AdminSession(pub AuthSession);

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session =
            <AuthSession as FromRequestParts<AppState>>::from_request_parts(parts, state).await?;

        if session.identity.role != Role::Admin {
            tracing::warn!(
                action = "admin_denied",
                user_id = session.identity.id,
                "Non-admin on admin route"
            );
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(AdminSession(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))).unwrap(), "abc");
        assert!(bearer_token(&parts_with(None)).is_err());
        assert!(bearer_token(&parts_with(Some("Basic abc"))).is_err());
        assert!(bearer_token(&parts_with(Some("Bearer "))).is_err());
        assert!(bearer_token(&parts_with(Some("abc"))).is_err());
    }
}
