//! Access guard
//!
//! The single point where a raw `Authorization` header becomes a
//! [`Principal`] that resource handlers can trust.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::AuthError;
use super::jwt::Claims;
use super::verifier::TokenVerifier;

/// The authenticated caller
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    /// Subject claim: the identifier for local tokens, the user id for provider tokens
    pub subject: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub session_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub claims: Claims,
}

impl Principal {
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            subject: claims.sub.clone(),
            email: claims.get_str("email").map(str::to_string),
            role: claims.get_str("role").map(str::to_string),
            session_id: claims.get_str("session_id").map(str::to_string),
            expires_at: DateTime::from_timestamp(claims.exp, 0),
            claims,
        }
    }
}

/// Extract the token from a `Bearer <token>` header value.
///
/// The scheme is matched case-insensitively; anything else yields `None`.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Turns bearer headers into principals.
#[derive(Clone)]
pub struct AccessGuard {
    verifier: TokenVerifier,
}

impl AccessGuard {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Authenticate a raw `Authorization` header value.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, AuthError> {
        let token = bearer_token(header).ok_or(AuthError::MissingToken)?;
        self.authenticate_token(token).await
    }

    /// Authenticate an already extracted bearer token.
    pub async fn authenticate_token(&self, token: &str) -> Result<Principal, AuthError> {
        match self.verifier.verify(token).await {
            Ok(claims) => Ok(Principal::from_claims(claims)),
            Err(e) => {
                tracing::debug!(error = %e, "Bearer token rejected");
                Err(AuthError::Token(e))
            }
        }
    }
}
