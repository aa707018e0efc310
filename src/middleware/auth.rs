//! Authentication extractors
//!
//! [`AuthenticatedUser`] runs the access guard on the `Authorization`
//! header and rejects the request with a JSON error when it fails.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

use crate::auth::{bearer_token, AccessGuard, Principal};
use crate::error::ApiError;

/// Authenticated caller extracted from a bearer token
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, {}", user.principal.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub principal: Principal,
    /// The verified raw token, for calls that forward it to the provider
    pub access_token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AccessGuard>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let guard = Arc::<AccessGuard>::from_ref(state);
        let principal = guard.authenticate(header).await?;

        // authenticate() succeeded, so the header held a bearer token.
        let access_token = bearer_token(header).unwrap_or_default().to_string();

        Ok(AuthenticatedUser {
            principal,
            access_token,
        })
    }
}

/// The raw bearer token, if any, without verifying it.
///
/// Used by logout, which must succeed for sessions that are already gone.
#[derive(Debug, Clone, Default)]
pub struct BearerToken(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        Ok(BearerToken(bearer_token(header).map(str::to_string)))
    }
}
