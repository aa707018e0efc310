//! Session manager
//!
//! Register, login, refresh and logout under the active trust model.
//!
//! In local mode credentials live in a [`CredentialStore`], access tokens
//! are signed by the [`TokenIssuer`] and refresh tokens are opaque random
//! strings whose SHA-256 digest is kept in a [`RefreshTokenStore`]. Each
//! refresh token is single use: refreshing consumes it and hands out a new
//! one.
//!
//! In provider mode every operation is forwarded to the
//! [`IdentityProvider`], which owns session state and rotation.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use rand::RngCore;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::error::AuthError;
use super::guard::Principal;
use super::jwt::{TokenError, TokenIssuer};
use super::password::{PasswordError, PasswordHasher};
use crate::provider::{IdentityProvider, ProviderError, ProviderSession, ProviderUser};
use crate::store::{
    CredentialStore, RefreshTokenRecord, RefreshTokenStore, StoreError, StoredCredential,
};

/// Public view of a user account
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<&StoredCredential> for UserProfile {
    fn from(credential: &StoredCredential) -> Self {
        Self {
            id: credential.id.to_string(),
            identifier: credential.identifier.clone(),
            role: None,
            created_at: Some(credential.created_at.to_rfc3339()),
        }
    }
}

impl From<ProviderUser> for UserProfile {
    fn from(user: ProviderUser) -> Self {
        Self {
            identifier: user.email.unwrap_or_else(|| user.id.clone()),
            id: user.id,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Access and refresh token pair handed to the client
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl From<ProviderSession> for Session {
    fn from(session: ProviderSession) -> Self {
        Self {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            token_type: session.token_type,
            expires_in: session.expires_in,
            user: session.user.map(UserProfile::from),
        }
    }
}

/// Result of a successful registration
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: UserProfile,
    /// The provider requires email confirmation before the first login.
    pub pending_verification: bool,
}

/// Local trust model: own credential store, own tokens.
#[derive(Clone)]
pub struct LocalSessions {
    credentials: Arc<dyn CredentialStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
    /// Hash checked when the identifier is unknown, built on first use
    dummy_hash: Arc<OnceCell<String>>,
}

impl LocalSessions {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        issuer: TokenIssuer,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            credentials,
            refresh_tokens,
            hasher: PasswordHasher::default(),
            issuer,
            refresh_ttl,
            clock: Arc::new(SystemClock),
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self.dummy_hash = Arc::new(OnceCell::new());
        self
    }

    /// Clock used for refresh-token expiry. Give the issuer the same one.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn register(&self, identifier: &str, secret: &str) -> Result<Registration, AuthError> {
        if self.credentials.find_by_identifier(identifier).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let hasher = self.hasher;
        let secret = secret.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))??;

        let credential = StoredCredential::new(identifier, password_hash);
        let user = UserProfile::from(&credential);

        // A concurrent registration may still win the race; the store settles it.
        match self.credentials.insert(credential).await {
            Ok(()) => {}
            Err(StoreError::Duplicate) => return Err(AuthError::AlreadyExists),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.id, "Registered local account");
        Ok(Registration {
            user,
            pending_verification: false,
        })
    }

    async fn login(&self, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        let credential = self.credentials.find_by_identifier(identifier).await?;

        // An unknown identifier still costs one bcrypt verification.
        let stored_hash = match &credential {
            Some(credential) => credential.password_hash.clone(),
            None => self.dummy_hash().await?,
        };

        let hasher = self.hasher;
        let secret = secret.to_string();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&secret, &stored_hash))
            .await
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

        let credential = match credential {
            Some(credential) if matches => credential,
            _ => return Err(AuthError::InvalidCredentials),
        };

        let session = self.start_session(&credential).await?;
        tracing::info!(user_id = %credential.id, "Local login succeeded");
        Ok(session)
    }

    async fn dummy_hash(&self) -> Result<String, AuthError> {
        let hasher = self.hasher;
        self.dummy_hash
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || hasher.hash("no-such-account"))
                    .await
                    .map_err(|e| PasswordError::HashingFailed(e.to_string()))?
            })
            .await
            .cloned()
            .map_err(AuthError::from)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let record = self
            .refresh_tokens
            .consume(&hash_token(refresh_token), self.clock.now())
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let credential = self.credentials.find_by_identifier(&record.subject).await?;
        let Some(credential) = credential else {
            // The account behind the token is gone.
            return Err(AuthError::InvalidRefreshToken);
        };

        self.start_session(&credential).await
    }

    async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        if let Some(token) = refresh_token {
            self.refresh_tokens.revoke(&hash_token(token)).await?;
        }
        Ok(())
    }

    async fn current_user(&self, principal: &Principal) -> Result<UserProfile, AuthError> {
        self.credentials
            .find_by_identifier(&principal.subject)
            .await?
            .map(|credential| UserProfile::from(&credential))
            .ok_or(AuthError::InvalidCredentials)
    }

    async fn start_session(&self, credential: &StoredCredential) -> Result<Session, AuthError> {
        let subject = credential.identifier.as_str();
        let mut extra = Map::new();
        extra.insert(
            "session_id".to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );

        let access = self.issuer.issue(subject, Some(extra))?;

        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.refresh_ttl)
            .ok_or_else(|| {
                TokenError::EncodingFailed("refresh token lifetime out of range".to_string())
            })?;

        let refresh_token = generate_refresh_token();
        self.refresh_tokens
            .insert(RefreshTokenRecord {
                token_hash: hash_token(&refresh_token),
                subject: subject.to_string(),
                expires_at,
            })
            .await?;

        Ok(Session {
            access_token: access.token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: Some(self.issuer.ttl().num_seconds()),
            user: Some(UserProfile::from(credential)),
        })
    }
}

#[derive(Clone)]
enum Backend {
    Local(LocalSessions),
    Provider(Arc<dyn IdentityProvider>),
}

/// Session manager for the active trust model
#[derive(Clone)]
pub struct AuthService {
    backend: Backend,
}

impl AuthService {
    pub fn local(sessions: LocalSessions) -> Self {
        Self {
            backend: Backend::Local(sessions),
        }
    }

    pub fn provider(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            backend: Backend::Provider(provider),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self.backend {
            Backend::Local(_) => "local",
            Backend::Provider(_) => "provider",
        }
    }

    /// Create an account.
    pub async fn register(&self, identifier: &str, secret: &str) -> Result<Registration, AuthError> {
        match &self.backend {
            Backend::Local(local) => local.register(identifier, secret).await,
            Backend::Provider(provider) => {
                let outcome = provider
                    .sign_up(identifier, secret)
                    .await
                    .map_err(|e| provider_failure(e, AuthError::RegistrationFailed))?;

                Ok(Registration {
                    pending_verification: outcome.session.is_none(),
                    user: outcome.user.into(),
                })
            }
        }
    }

    /// Exchange credentials for a session.
    ///
    /// An unknown identifier and a wrong password fail identically.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        match &self.backend {
            Backend::Local(local) => local.login(identifier, secret).await,
            Backend::Provider(provider) => provider
                .sign_in_with_password(identifier, secret)
                .await
                .map(Session::from)
                .map_err(|e| provider_failure(e, |_| AuthError::InvalidCredentials)),
        }
    }

    /// Exchange a refresh token for a new session with a rotated refresh token.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<Session, AuthError> {
        let refresh_token = refresh_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;

        match &self.backend {
            Backend::Local(local) => local.refresh(refresh_token).await,
            Backend::Provider(provider) => provider
                .refresh_session(refresh_token)
                .await
                .map(Session::from)
                .map_err(|e| provider_failure(e, |_| AuthError::InvalidRefreshToken)),
        }
    }

    /// End a session. Calling this for a session that is already gone succeeds.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError> {
        let refresh_token = refresh_token.map(str::trim).filter(|t| !t.is_empty());

        match &self.backend {
            Backend::Local(local) => local.logout(refresh_token).await,
            Backend::Provider(provider) => {
                let Some(access_token) = access_token else {
                    return Ok(());
                };
                match provider.sign_out(access_token).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_unavailable() => Err(AuthError::ProviderUnavailable(e.message)),
                    Err(e) => {
                        tracing::debug!(reason = %e.message, "Provider reports session already ended");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Account details for an authenticated principal.
    pub async fn current_user(
        &self,
        principal: &Principal,
        access_token: &str,
    ) -> Result<UserProfile, AuthError> {
        match &self.backend {
            Backend::Local(local) => local.current_user(principal).await,
            Backend::Provider(provider) => provider
                .get_user(access_token)
                .await
                .map(UserProfile::from)
                .map_err(|e| provider_failure(e, |_| AuthError::InvalidCredentials)),
        }
    }
}

/// Outages become `ProviderUnavailable`; rejections go through `rejected`.
fn provider_failure(e: ProviderError, rejected: impl FnOnce(String) -> AuthError) -> AuthError {
    if e.is_unavailable() {
        tracing::warn!(error = %e.message, "Identity provider unavailable");
        AuthError::ProviderUnavailable(e.message)
    } else {
        rejected(e.message)
    }
}

/// 32 random bytes, base64url without padding.
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token for storage
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::FixedClock;
    use crate::store::{InMemoryCredentialStore, InMemoryRefreshTokenStore};
    use jsonwebtoken::Algorithm;

    fn sessions(refresh_ttl: Duration) -> LocalSessions {
        let clock = Arc::new(FixedClock::at_timestamp(1_700_000_000));
        let issuer = TokenIssuer::new("service-secret", Algorithm::HS256, Duration::minutes(30))
            .unwrap()
            .with_clock(clock.clone());
        LocalSessions::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryRefreshTokenStore::new()),
            issuer,
            refresh_ttl,
        )
        .with_hasher(PasswordHasher::with_cost(4))
        .with_clock(clock)
    }

    #[tokio::test]
    async fn test_unknown_identifier_still_runs_bcrypt() {
        let sessions = sessions(Duration::days(7));
        assert!(!sessions.dummy_hash.initialized());

        let err = sessions.login("nobody", "secret123").await.unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
        let dummy = sessions.dummy_hash.get().unwrap();
        // Same cost as real credentials, so the miss takes as long as a mismatch.
        assert!(dummy.starts_with("$2b$04$"));
    }

    #[tokio::test]
    async fn test_dummy_hash_never_authenticates() {
        let sessions = sessions(Duration::days(7));
        assert_eq!(
            sessions.login("nobody", "no-such-account").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_out_of_range_refresh_lifetime_is_an_error() {
        let sessions = sessions(Duration::days(100_000_000));
        sessions.register("alice", "secret123").await.unwrap();

        let err = sessions.login("alice", "secret123").await.unwrap_err();

        assert!(matches!(err, AuthError::Token(TokenError::EncodingFailed(_))));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_refresh_tokens_are_unique_and_url_safe() {
        let first = generate_refresh_token();
        let second = generate_refresh_token();
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let digest = hash_token("token");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("token"));
        assert_ne!(digest, hash_token("other"));
    }
}
