//! Auth and profile API endpoints.

use crate::auth::middleware::{AppState, AuthSession};
use crate::error::AppError;
use crate::models::{
    IdentityInfo, LoginRequest, PhoneLoginRequest, PhoneSignupRequest, ProfileUpdate, Purpose,
    SendCodeRequest, SignupRequest, TokenResponse,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

fn require(value: &str, message: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(message.to_string()));
    }
    Ok(())
}

/// POST /signup — Register with email and password
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    require(&req.email, "email and password required")?;
    require(&req.password, "email and password required")?;

    let identity = state.auth.signup(&req.name, &req.email, &req.password).await?;

    Ok((StatusCode::CREATED, Json(IdentityInfo::from(identity))))
}

/// POST /login — Exchange email and password for a session token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = state.auth.login(&req.email, &req.password).await?;
    Ok(Json(TokenResponse { token }))
}

/// POST /auth/send-code — Send a one-time code to a phone
///
/// The code itself is never part of the response.
pub async fn send_code(
    State(state): State<AppState>,
    Json(req): Json<SendCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    require(&req.phone, "phone and purpose required")?;
    let purpose = req
        .purpose
        .parse::<Purpose>()
        .map_err(AppError::BadRequest)?;

    state.auth.send_code(&req.phone, purpose).await?;

    Ok(Json(json!({ "message": "code sent" })))
}

/// POST /signup/phone — Register with a phone and a signup code
pub async fn signup_phone(
    State(state): State<AppState>,
    Json(req): Json<PhoneSignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    require(&req.phone, "phone, code and password required")?;
    require(&req.code, "phone, code and password required")?;
    require(&req.password, "phone, code and password required")?;

    let identity = state
        .auth
        .signup_with_phone(&req.name, &req.phone, &req.code, &req.password)
        .await?;

    Ok((StatusCode::CREATED, Json(IdentityInfo::from(identity))))
}

/// POST /login/phone — Exchange a phone and a login code for a session token
pub async fn login_phone(
    State(state): State<AppState>,
    Json(req): Json<PhoneLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = state.auth.login_with_phone(&req.phone, &req.code).await?;
    Ok(Json(TokenResponse { token }))
}

/// GET /api/me — Current identity
pub async fn me(session: AuthSession) -> Json<IdentityInfo> {
    Json(IdentityInfo::from(session.identity))
}

/// PATCH /api/me — Replace profile fields
pub async fn update_me(
    State(state): State<AppState>,
    session: AuthSession,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let identity = state
        .auth
        .update_profile(session.identity.id, update)
        .await?;
    Ok(Json(IdentityInfo::from(identity)))
}
