//! JWT token generation and validation
//!
//! Handles creation of locally signed access tokens and the checks shared by
//! both verification paths (local HMAC and provider key set).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::clock::{Clock, SystemClock};
use crate::config::is_hmac;

/// Claims this module manages itself; callers cannot override them.
const RESERVED_CLAIMS: [&str; 3] = ["sub", "exp", "iat"];

/// Token verification and issuance errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token is malformed: {0}")]
    Malformed(String),

    #[error("Token has expired")]
    Expired,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("No key with id '{0}' in the published key set")]
    UnknownKey(String),

    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),
}

/// JWT claims carried by access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (principal identifier)
    pub sub: String,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Any further claims (email, role, session id, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Read a string-valued extra claim.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Local token issuer and symmetric verifier.
///
/// Secret, algorithm and TTL are fixed at construction and never change.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Arc<[u8]>,
    algorithm: Algorithm,
    ttl: Duration,
    leeway_seconds: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer signing with `secret` under an HMAC `algorithm`.
    pub fn new(secret: &str, algorithm: Algorithm, ttl: Duration) -> Result<Self, TokenError> {
        if !is_hmac(algorithm) {
            return Err(TokenError::EncodingFailed(format!(
                "{:?} is not a shared-secret algorithm",
                algorithm
            )));
        }

        Ok(Self {
            secret: Arc::from(secret.as_bytes()),
            algorithm,
            ttl,
            leeway_seconds: 0,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Allow `leeway_seconds` past `exp` before a token counts as expired.
    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign an access token for `subject`, valid for the configured TTL.
    ///
    /// `extra` claims are merged in; `sub`, `exp` and `iat` cannot be overridden.
    pub fn issue(
        &self,
        subject: &str,
        extra: Option<Map<String, Value>>,
    ) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::EncodingFailed("token lifetime out of range".to_string()))?;

        let mut extra = extra.unwrap_or_default();
        extra.retain(|key, _| !RESERVED_CLAIMS.contains(&key.as_str()));

        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: Some(now.timestamp()),
            extra,
        };

        let token = encode(
            &Header::new(self.algorithm),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| TokenError::EncodingFailed(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify signature and expiry of a locally issued token.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = validation_for(self.algorithm, None);
        let claims = decode_claims(token, &DecodingKey::from_secret(&self.secret), &validation)?;
        check_expiry(&claims, self.clock.now(), self.leeway_seconds)?;
        Ok(claims)
    }
}

/// Validation that checks the signature, algorithm and required claims.
///
/// Expiry is checked separately by [`check_expiry`] against the injected clock.
pub(crate) fn validation_for(algorithm: Algorithm, audience: Option<&str>) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.required_spec_claims = ["sub", "exp"]
        .iter()
        .map(|claim| claim.to_string())
        .collect::<HashSet<_>>();

    match audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    validation
}

/// Decode and check the signature of `token`, mapping library errors onto
/// the token taxonomy.
pub(crate) fn decode_claims(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<Claims, TokenError> {
    decode::<Claims>(token, key, validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::InvalidSignature
            }
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed(e.to_string()),
        })
}

/// Reject tokens whose `exp` has been reached at `now`.
pub(crate) fn check_expiry(
    claims: &Claims,
    now: DateTime<Utc>,
    leeway_seconds: u64,
) -> Result<(), TokenError> {
    let deadline = claims.exp.saturating_add(leeway_seconds as i64);
    if now.timestamp() >= deadline {
        return Err(TokenError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::FixedClock;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn issuer_at(secret: &str, clock: &FixedClock) -> TokenIssuer {
        TokenIssuer::new(secret, Algorithm::HS256, Duration::minutes(30))
            .unwrap()
            .with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let clock = FixedClock::at_timestamp(NOW);
        let issuer = issuer_at("test-secret-key", &clock);

        let issued = issuer.issue("alice", None).unwrap();
        assert!(!issued.token.is_empty());
        assert_eq!(issued.expires_at.timestamp(), NOW + 30 * 60);

        let claims = issuer.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp, NOW + 30 * 60);
        assert_eq!(claims.iat, Some(NOW));
    }

    #[test]
    fn test_issue_is_deterministic_under_fixed_clock() {
        let clock = FixedClock::at_timestamp(NOW);
        let issuer = issuer_at("test-secret-key", &clock);

        let first = issuer.issue("alice", None).unwrap();
        let second = issuer.issue("alice", None).unwrap();
        assert_eq!(first.token, second.token);
    }

    #[test]
    fn test_expiry_boundary() {
        let clock = FixedClock::at_timestamp(NOW);
        let issuer = issuer_at("test-secret-key", &clock);
        let token = issuer.issue("alice", None).unwrap().token;

        clock.set(DateTime::from_timestamp(NOW + 30 * 60 - 1, 0).unwrap());
        assert!(issuer.verify(&token).is_ok());

        clock.set(DateTime::from_timestamp(NOW + 30 * 60 + 1, 0).unwrap());
        assert_eq!(issuer.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_leeway_extends_validity() {
        let clock = FixedClock::at_timestamp(NOW);
        let issuer = issuer_at("test-secret-key", &clock).with_leeway(60);
        let token = issuer.issue("alice", None).unwrap().token;

        clock.set(DateTime::from_timestamp(NOW + 30 * 60 + 30, 0).unwrap());
        assert!(issuer.verify(&token).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let clock = FixedClock::at_timestamp(NOW);
        let token = issuer_at("secret-a", &clock).issue("alice", None).unwrap().token;

        let result = issuer_at("secret-b", &clock).verify(&token);
        assert_eq!(result, Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_wrong_secret_wins_over_expiry() {
        let clock = FixedClock::at_timestamp(NOW);
        let token = issuer_at("secret-a", &clock).issue("alice", None).unwrap().token;

        clock.advance(Duration::days(1));
        let result = issuer_at("secret-b", &clock).verify(&token);
        assert_eq!(result, Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let clock = FixedClock::at_timestamp(NOW);
        let issuer = issuer_at("test-secret-key", &clock);

        assert!(matches!(
            issuer.verify("invalid.token.here"),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            issuer.verify("not-a-jwt"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_extra_claims_cannot_override_reserved() {
        let clock = FixedClock::at_timestamp(NOW);
        let issuer = issuer_at("test-secret-key", &clock);

        let extra = json!({ "sub": "mallory", "exp": i64::MAX, "role": "admin" });
        let token = issuer
            .issue("alice", extra.as_object().cloned())
            .unwrap()
            .token;

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp, NOW + 30 * 60);
        assert_eq!(claims.get_str("role"), Some("admin"));
    }

    #[test]
    fn test_rejects_non_hmac_algorithm() {
        let result = TokenIssuer::new("secret", Algorithm::RS256, Duration::minutes(30));
        assert!(result.is_err());
    }
    #[test]
    fn test_lifetime_past_calendar_range_is_an_error() {
        let issuer = TokenIssuer::new("secret", Algorithm::HS256, Duration::days(100_000_000))
            .unwrap()
            .with_clock(Arc::new(FixedClock::at_timestamp(NOW)));

        assert!(matches!(
            issuer.issue("alice", None),
            Err(TokenError::EncodingFailed(_))
        ));
    }
}
