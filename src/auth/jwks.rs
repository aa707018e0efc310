//! Verification of provider-issued tokens against a published key set.
//!
//! The key set is cached for a configurable TTL. A token whose `kid` is not
//! in the cached set triggers one refetch before it is reported as
//! [`TokenError::UnknownKey`], so a routine key rotation is picked up without
//! waiting for the cache to expire. Such refetches are rate limited: within
//! the refetch cooldown of the last fetch an unknown `kid` is rejected from
//! the cache alone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode_header, Algorithm, DecodingKey};
use tokio::sync::RwLock;

use super::clock::{Clock, SystemClock};
use super::jwt::{check_expiry, decode_claims, validation_for, Claims, TokenError};
use crate::provider::ProviderError;

/// Minimum age of the cached key set before an unknown `kid` may refetch it.
pub const DEFAULT_REFETCH_COOLDOWN: Duration = Duration::from_secs(30);

/// Where the published key set comes from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch_key_set(&self) -> Result<JwkSet, ProviderError>;
}

struct CacheEntry {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Asymmetric verifier backed by a remote key set.
#[derive(Clone)]
pub struct KeySetVerifier {
    source: Arc<dyn KeySetSource>,
    algorithm: Algorithm,
    audience: Option<String>,
    leeway_seconds: u64,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    refetch_cooldown: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
}

impl KeySetVerifier {
    pub fn new(source: Arc<dyn KeySetSource>, algorithm: Algorithm) -> Self {
        Self {
            source,
            algorithm,
            audience: None,
            leeway_seconds: 0,
            clock: Arc::new(SystemClock),
            cache_ttl: Duration::from_secs(300),
            refetch_cooldown: DEFAULT_REFETCH_COOLDOWN,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Require the `aud` claim to equal `audience`.
    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// A zero TTL fetches the key set on every verification.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.refetch_cooldown = cooldown;
        self
    }

    /// Verify `token`: resolve its key by `kid`, then check signature and expiry.
    pub async fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| TokenError::Malformed("token header has no key id".to_string()))?;

        let (keys, cached_for) = self.key_set().await?;
        let jwk = match find_key(&keys, &kid) {
            Some(jwk) => jwk.clone(),
            None if cached_for.is_some_and(|age| age >= self.refetch_cooldown) => {
                tracing::debug!(kid = %kid, "Key id not in cached key set, refetching");
                let keys = self.refetch().await?;
                find_key(&keys, &kid)
                    .cloned()
                    .ok_or_else(|| TokenError::UnknownKey(kid.clone()))?
            }
            None => return Err(TokenError::UnknownKey(kid)),
        };

        let key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            TokenError::KeySetUnavailable(format!("key '{}' is not usable: {}", kid, e))
        })?;

        let validation = validation_for(self.algorithm, self.audience.as_deref());
        let claims = decode_claims(token, &key, &validation)?;
        check_expiry(&claims, self.clock.now(), self.leeway_seconds)?;
        Ok(claims)
    }

    /// Force a refetch of the key set.
    pub async fn refresh(&self) -> Result<(), TokenError> {
        self.refetch().await.map(|_| ())
    }

    /// Whether a fresh key set is cached.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .map(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
            .unwrap_or(false)
    }

    /// Current key set, with its age when it was served from the cache.
    async fn key_set(&self) -> Result<(JwkSet, Option<Duration>), TokenError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                let age = entry.fetched_at.elapsed();
                if age < self.cache_ttl {
                    return Ok((entry.keys.clone(), Some(age)));
                }
            }
        }

        Ok((self.refetch().await?, None))
    }

    async fn refetch(&self) -> Result<JwkSet, TokenError> {
        let keys = self
            .source
            .fetch_key_set()
            .await
            .map_err(|e| TokenError::KeySetUnavailable(e.message))?;

        if !self.cache_ttl.is_zero() {
            let mut cache = self.cache.write().await;
            *cache = Some(CacheEntry {
                keys: keys.clone(),
                fetched_at: Instant::now(),
            });
        }

        Ok(keys)
    }
}

fn find_key<'a>(keys: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    keys.keys
        .iter()
        .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
}
