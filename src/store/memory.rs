//! In-memory stores for development runs and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CredentialStore, RefreshTokenRecord, RefreshTokenStore, StoreError, StoredCredential};

#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    credentials: Arc<RwLock<HashMap<String, StoredCredential>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<StoredCredential>, StoreError> {
        Ok(self.credentials.read().await.get(identifier).cloned())
    }

    async fn insert(&self, credential: StoredCredential) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(&credential.identifier) {
            return Err(StoreError::Duplicate);
        }
        credentials.insert(credential.identifier.clone(), credential);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: Arc<RwLock<HashMap<String, RefreshTokenRecord>>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&record.token_hash) {
            return Err(StoreError::Duplicate);
        }
        tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn consume(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = self.tokens.write().await.remove(token_hash);
        Ok(record.filter(|r| r.expires_at > now))
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), StoreError> {
        self.tokens.write().await.remove(token_hash);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, record| record.expires_at > now);
        Ok((before - tokens.len()) as u64)
    }
}
