//! External identity provider
//!
//! The provider owns user records and session state in provider mode. Every
//! reply is normalized into `Result<T, ProviderError>` at this boundary so
//! callers never see the provider's own response shapes.

pub mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use supabase::SupabaseClient;

/// How a provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The provider understood the request and refused it.
    Rejected,
    /// The provider could not be reached or failed internally. Retryable.
    Unavailable,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Rejected,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.kind == ProviderErrorKind::Unavailable
    }
}

/// A user record as the provider reports it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Access and refresh token pair minted by the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user: Option<ProviderUser>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Result of a sign-up. `session` is absent while email confirmation is pending.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub user: ProviderUser,
    pub session: Option<ProviderSession>,
}

/// Operations the gateway needs from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<SignUpOutcome, ProviderError>;

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<ProviderSession, ProviderError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError>;

    /// Revoke the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError>;

    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError>;
}
