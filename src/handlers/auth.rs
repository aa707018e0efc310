//! Authentication HTTP handlers
//!
//! Register, login, refresh, logout and the current-user lookup. Refresh
//! tokens travel in the JSON body only.

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use super::{AuthenticatedUser, BearerToken};
use crate::auth::{Session, UserProfile};
use crate::error::ApiError;
use crate::models::{CredentialsRequest, LogoutRequest, RefreshTokenRequest, RegisterResponse};
use crate::state::AppState;

/// POST /auth/register - Create an account
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let req = req.normalized();
    req.validate()?;

    let registration = state
        .auth_service
        .register(&req.identifier, &req.password)
        .await?;

    let message = if registration.pending_verification {
        "Registration successful. Check your email to confirm your address."
    } else {
        "Registration successful."
    };

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: message.to_string(),
            user: registration.user,
            pending_verification: registration.pending_verification,
        }),
    ))
}

/// POST /auth/login - Exchange credentials for a session
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<Session>, ApiError> {
    let req = req.normalized();
    let session = state
        .auth_service
        .login(&req.identifier, &req.password)
        .await?;

    Ok(Json(session))
}

/// POST /auth/refresh - Rotate the session using a refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    body: Option<Json<RefreshTokenRequest>>,
) -> Result<Json<Session>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let session = state
        .auth_service
        .refresh(req.refresh_token.as_deref())
        .await?;

    Ok(Json(session))
}

/// POST /auth/logout - End the session
///
/// Succeeds when the session is already gone.
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(access_token): BearerToken,
    body: Option<Json<LogoutRequest>>,
) -> Result<StatusCode, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    state
        .auth_service
        .logout(access_token.as_deref(), req.refresh_token.as_deref())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/me - Get the current user
pub async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .auth_service
        .current_user(&user.principal, &user.access_token)
        .await?;

    Ok(Json(profile))
}
