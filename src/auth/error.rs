//! Authentication and session errors
//!
//! Every failure the guard or the session manager can report. Each variant
//! carries a stable error code and the HTTP status it maps to at the API
//! boundary; only dependency outages are reported as server-side failures.

use axum::http::StatusCode;
use thiserror::Error;

use super::jwt::TokenError;
use super::password::PasswordError;
use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header with a Bearer token is required")]
    MissingToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("An account with this identifier already exists")]
    AlreadyExists,

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Password not accepted: {0}")]
    InvalidPassword(String),

    #[error("Refresh token is required")]
    MissingRefreshToken,

    #[error("Refresh token is invalid or expired, please log in again")]
    InvalidRefreshToken,

    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Password hashing failed: {0}")]
    PasswordHashing(String),
}

impl AuthError {
    /// Stable, machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::Token(TokenError::Malformed(_)) => "MALFORMED_TOKEN",
            AuthError::Token(TokenError::Expired) => "TOKEN_EXPIRED",
            AuthError::Token(TokenError::InvalidSignature) => "INVALID_SIGNATURE",
            AuthError::Token(TokenError::UnknownKey(_)) => "UNKNOWN_KEY",
            AuthError::Token(TokenError::KeySetUnavailable(_)) => "KEY_SET_UNAVAILABLE",
            AuthError::Token(TokenError::EncodingFailed(_)) => "TOKEN_ENCODING_FAILED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AlreadyExists => "ALREADY_EXISTS",
            AuthError::RegistrationFailed(_) => "REGISTRATION_FAILED",
            AuthError::InvalidPassword(_) => "INVALID_PASSWORD",
            AuthError::MissingRefreshToken => "MISSING_REFRESH_TOKEN",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            AuthError::Storage(_) => "STORAGE_ERROR",
            AuthError::PasswordHashing(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            AuthError::Token(TokenError::KeySetUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Token(TokenError::EncodingFailed(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Token(_) => StatusCode::UNAUTHORIZED,
            AuthError::AlreadyExists => StatusCode::CONFLICT,
            AuthError::RegistrationFailed(_)
            | AuthError::InvalidPassword(_)
            | AuthError::MissingRefreshToken => StatusCode::BAD_REQUEST,
            AuthError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Storage(_) | AuthError::PasswordHashing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the failure lies with a dependency rather than the caller.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::TooLong { .. } => AuthError::InvalidPassword(e.to_string()),
            PasswordError::HashingFailed(_) => AuthError::PasswordHashing(e.to_string()),
        }
    }
}
