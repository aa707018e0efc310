//! Session Lifecycle Tests
//!
//! Register, login, refresh and logout under both trust models: local
//! credentials with HMAC tokens, and a scripted identity provider.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use jsonwebtoken::Algorithm;

use salon_gateway::auth::{
    AccessGuard, AuthError, AuthService, FixedClock, LocalSessions, PasswordHasher, TokenError,
    TokenIssuer, TokenVerifier,
};
use salon_gateway::provider::{
    IdentityProvider, ProviderError, ProviderSession, ProviderUser, SignUpOutcome,
};
use salon_gateway::store::{InMemoryCredentialStore, InMemoryRefreshTokenStore};

const NOW: i64 = 1_700_000_000;

struct LocalHarness {
    service: AuthService,
    guard: AccessGuard,
    credentials: InMemoryCredentialStore,
    refresh_tokens: InMemoryRefreshTokenStore,
    clock: FixedClock,
}

fn local_harness() -> LocalHarness {
    let clock = FixedClock::at_timestamp(NOW);
    let credentials = InMemoryCredentialStore::new();
    let refresh_tokens = InMemoryRefreshTokenStore::new();

    let issuer = TokenIssuer::new("session-test-secret", Algorithm::HS256, Duration::minutes(30))
        .unwrap()
        .with_clock(Arc::new(clock.clone()));

    let sessions = LocalSessions::new(
        Arc::new(credentials.clone()),
        Arc::new(refresh_tokens.clone()),
        issuer.clone(),
        Duration::days(7),
    )
    .with_hasher(PasswordHasher::with_cost(4))
    .with_clock(Arc::new(clock.clone()));

    LocalHarness {
        service: AuthService::local(sessions),
        guard: AccessGuard::new(TokenVerifier::Local(issuer)),
        credentials,
        refresh_tokens,
        clock,
    }
}

// ============================================================================
// Local Trust Model
// ============================================================================

#[tokio::test]
async fn test_register_then_login_issues_usable_token() {
    let h = local_harness();

    let registration = h.service.register("alice", "secret123").await.unwrap();
    assert_eq!(registration.user.identifier, "alice");
    assert!(!registration.pending_verification);

    let session = h.service.login("alice", "secret123").await.unwrap();
    assert!(!session.access_token.is_empty());
    assert!(!session.refresh_token.is_empty());
    assert_eq!(session.token_type, "bearer");
    assert_eq!(session.expires_in, Some(30 * 60));

    let principal = h
        .guard
        .authenticate(Some(&format!("Bearer {}", session.access_token)))
        .await
        .unwrap();
    assert_eq!(principal.subject, "alice");
    assert!(principal.session_id.is_some());
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_fail_identically() {
    let h = local_harness();
    h.service.register("alice", "secret123").await.unwrap();

    let wrong_password = h.service.login("alice", "wrongpass").await.unwrap_err();
    let unknown_user = h.service.login("mallory", "secret123").await.unwrap_err();

    assert_eq!(wrong_password, AuthError::InvalidCredentials);
    assert_eq!(unknown_user, AuthError::InvalidCredentials);
}

#[tokio::test]
async fn test_duplicate_registration_keeps_one_credential() {
    let h = local_harness();
    h.service.register("alice", "secret123").await.unwrap();

    let second = h.service.register("alice", "another-password").await;

    assert_eq!(second.unwrap_err(), AuthError::AlreadyExists);
    assert_eq!(h.credentials.len().await, 1);
    // The first password still works.
    assert!(h.service.login("alice", "secret123").await.is_ok());
}

#[tokio::test]
async fn test_password_is_never_stored_in_clear() {
    use salon_gateway::store::CredentialStore;

    let h = local_harness();
    h.service.register("alice", "secret123").await.unwrap();

    let stored = h
        .credentials
        .find_by_identifier("alice")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password_hash, "secret123");
    assert!(stored.password_hash.starts_with("$2"));
}

#[tokio::test]
async fn test_refresh_rotates_and_consumes_old_token() {
    let h = local_harness();
    h.service.register("alice", "secret123").await.unwrap();
    let first = h.service.login("alice", "secret123").await.unwrap();

    let second = h
        .service
        .refresh(Some(&first.refresh_token))
        .await
        .unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(h.refresh_tokens.len().await, 1);

    let reuse = h.service.refresh(Some(&first.refresh_token)).await;
    assert_eq!(reuse.unwrap_err(), AuthError::InvalidRefreshToken);

    // The rotated token is still good.
    assert!(h.service.refresh(Some(&second.refresh_token)).await.is_ok());
}

#[tokio::test]
async fn test_refresh_without_token_is_missing() {
    let h = local_harness();

    assert_eq!(
        h.service.refresh(None).await.unwrap_err(),
        AuthError::MissingRefreshToken
    );
    assert_eq!(
        h.service.refresh(Some("  ")).await.unwrap_err(),
        AuthError::MissingRefreshToken
    );
}

#[tokio::test]
async fn test_refresh_with_unknown_or_expired_token() {
    let h = local_harness();
    h.service.register("alice", "secret123").await.unwrap();
    let session = h.service.login("alice", "secret123").await.unwrap();

    assert_eq!(
        h.service.refresh(Some("not-a-real-token")).await.unwrap_err(),
        AuthError::InvalidRefreshToken
    );

    h.clock.advance(Duration::days(8));
    assert_eq!(
        h.service
            .refresh(Some(&session.refresh_token))
            .await
            .unwrap_err(),
        AuthError::InvalidRefreshToken
    );
}

#[tokio::test]
async fn test_logout_revokes_refresh_token_and_is_idempotent() {
    let h = local_harness();
    h.service.register("alice", "secret123").await.unwrap();
    let session = h.service.login("alice", "secret123").await.unwrap();

    h.service
        .logout(Some(&session.access_token), Some(&session.refresh_token))
        .await
        .unwrap();
    h.service
        .logout(Some(&session.access_token), Some(&session.refresh_token))
        .await
        .unwrap();
    h.service.logout(None, None).await.unwrap();

    assert!(h.refresh_tokens.is_empty().await);
    assert_eq!(
        h.service
            .refresh(Some(&session.refresh_token))
            .await
            .unwrap_err(),
        AuthError::InvalidRefreshToken
    );
}

#[tokio::test]
async fn test_access_token_expires_after_ttl() {
    let h = local_harness();
    h.service.register("alice", "secret123").await.unwrap();
    let session = h.service.login("alice", "secret123").await.unwrap();
    let header = format!("Bearer {}", session.access_token);

    h.clock.advance(Duration::minutes(30) - Duration::seconds(1));
    assert!(h.guard.authenticate(Some(&header)).await.is_ok());

    h.clock.advance(Duration::seconds(2));
    assert_eq!(
        h.guard.authenticate(Some(&header)).await.unwrap_err(),
        AuthError::Token(TokenError::Expired)
    );
}

#[tokio::test]
async fn test_current_user_reads_stored_credential() {
    let h = local_harness();
    h.service.register("alice", "secret123").await.unwrap();
    let session = h.service.login("alice", "secret123").await.unwrap();
    let principal = h
        .guard
        .authenticate(Some(&format!("Bearer {}", session.access_token)))
        .await
        .unwrap();

    let profile = h
        .service
        .current_user(&principal, &session.access_token)
        .await
        .unwrap();
    assert_eq!(profile.identifier, "alice");
}

// ============================================================================
// Provider Trust Model
// ============================================================================

/// Scripted provider: one user, rotating refresh tokens.
#[derive(Default)]
struct FakeProvider {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    registered: Vec<(String, String)>,
    live_refresh_token: Option<String>,
    issued: u32,
    signed_out: bool,
    down: bool,
}

impl FakeProvider {
    fn user(identifier: &str) -> ProviderUser {
        ProviderUser {
            id: format!("id-{}", identifier),
            email: Some(identifier.to_string()),
            role: Some("authenticated".to_string()),
            email_confirmed_at: None,
            created_at: None,
        }
    }

    fn new_session(state: &mut FakeState, identifier: &str) -> ProviderSession {
        state.issued += 1;
        let refresh_token = format!("refresh-{}", state.issued);
        state.live_refresh_token = Some(refresh_token.clone());
        state.signed_out = false;
        ProviderSession {
            access_token: format!("access-{}", state.issued),
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            user: Some(Self::user(identifier)),
        }
    }

    fn check_up(state: &FakeState) -> Result<(), ProviderError> {
        if state.down {
            Err(ProviderError::unavailable("provider returned HTTP 503"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<SignUpOutcome, ProviderError> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        if secret.len() < 6 {
            return Err(ProviderError::rejected("Password should be at least 6 characters"));
        }
        if state.registered.iter().any(|(id, _)| id == identifier) {
            return Err(ProviderError::rejected("User already registered"));
        }
        state
            .registered
            .push((identifier.to_string(), secret.to_string()));
        Ok(SignUpOutcome {
            user: Self::user(identifier),
            session: None,
        })
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<ProviderSession, ProviderError> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        let known = state
            .registered
            .iter()
            .any(|(id, pw)| id == identifier && pw == secret);
        if !known {
            return Err(ProviderError::rejected("Invalid login credentials"));
        }
        Ok(Self::new_session(&mut state, identifier))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        if state.live_refresh_token.as_deref() != Some(refresh_token) {
            return Err(ProviderError::rejected("Invalid Refresh Token: Already Used"));
        }
        let identifier = state.registered[0].0.clone();
        Ok(Self::new_session(&mut state, &identifier))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        if state.signed_out {
            return Err(ProviderError::rejected("Session not found"));
        }
        state.signed_out = true;
        state.live_refresh_token = None;
        Ok(())
    }

    async fn get_user(&self, _access_token: &str) -> Result<ProviderUser, ProviderError> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        if state.signed_out {
            return Err(ProviderError::rejected("Session not found"));
        }
        Ok(Self::user(&state.registered[0].0))
    }
}

fn provider_service() -> (AuthService, Arc<FakeProvider>) {
    let provider = Arc::new(FakeProvider::default());
    (AuthService::provider(provider.clone()), provider)
}

#[tokio::test]
async fn test_provider_registration_is_pending_verification() {
    let (service, _) = provider_service();

    let registration = service
        .register("alice@example.com", "secret123")
        .await
        .unwrap();

    assert!(registration.pending_verification);
    assert_eq!(registration.user.identifier, "alice@example.com");
}

#[tokio::test]
async fn test_provider_registration_rejection_carries_reason() {
    let (service, _) = provider_service();
    service
        .register("alice@example.com", "secret123")
        .await
        .unwrap();

    let err = service
        .register("alice@example.com", "secret123")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthError::RegistrationFailed("User already registered".to_string())
    );
}

#[tokio::test]
async fn test_provider_login_rejection_is_invalid_credentials() {
    let (service, _) = provider_service();
    service
        .register("alice@example.com", "secret123")
        .await
        .unwrap();

    assert!(service.login("alice@example.com", "secret123").await.is_ok());
    assert_eq!(
        service
            .login("alice@example.com", "wrongpass")
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    );
}

#[tokio::test]
async fn test_provider_refresh_reuse_is_rejected() {
    let (service, _) = provider_service();
    service
        .register("alice@example.com", "secret123")
        .await
        .unwrap();
    let first = service.login("alice@example.com", "secret123").await.unwrap();

    let second = service.refresh(Some(&first.refresh_token)).await.unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);

    assert_eq!(
        service
            .refresh(Some(&first.refresh_token))
            .await
            .unwrap_err(),
        AuthError::InvalidRefreshToken
    );
}

#[tokio::test]
async fn test_provider_logout_twice_is_ok() {
    let (service, _) = provider_service();
    service
        .register("alice@example.com", "secret123")
        .await
        .unwrap();
    let session = service.login("alice@example.com", "secret123").await.unwrap();

    service
        .logout(Some(&session.access_token), None)
        .await
        .unwrap();
    service
        .logout(Some(&session.access_token), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_provider_outage_is_unavailable_not_credential_failure() {
    let (service, provider) = provider_service();
    provider.state.lock().unwrap().down = true;

    let err = service
        .login("alice@example.com", "secret123")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    assert!(err.is_server_error());

    let err = service.logout(Some("access-1"), None).await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
}
