//! The token verifier for the active trust model.

use super::jwks::KeySetVerifier;
use super::jwt::{Claims, TokenError, TokenIssuer};

/// Verifies bearer tokens under exactly one trust model.
#[derive(Clone)]
pub enum TokenVerifier {
    /// Tokens signed by this process with the shared secret.
    Local(TokenIssuer),
    /// Tokens signed by the identity provider, checked against its key set.
    KeySet(KeySetVerifier),
}

impl TokenVerifier {
    pub async fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        match self {
            TokenVerifier::Local(issuer) => issuer.verify(token),
            TokenVerifier::KeySet(verifier) => verifier.verify(token).await,
        }
    }

    /// Key-set status for health reporting. `None` in local mode.
    pub async fn key_set_cached(&self) -> Option<bool> {
        match self {
            TokenVerifier::Local(_) => None,
            TokenVerifier::KeySet(verifier) => Some(verifier.is_cached().await),
        }
    }

    /// Refresh the provider key set. A no-op in local mode.
    pub async fn refresh_key_set(&self) -> Result<(), TokenError> {
        match self {
            TokenVerifier::Local(_) => Ok(()),
            TokenVerifier::KeySet(verifier) => verifier.refresh().await,
        }
    }
}
