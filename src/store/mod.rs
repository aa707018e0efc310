//! Storage for local credentials and refresh tokens
//!
//! Both stores are traits so the session manager runs unchanged against
//! Postgres or the in-memory implementations.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use memory::{InMemoryCredentialStore, InMemoryRefreshTokenStore};
pub use postgres::{PgCredentialStore, PgRefreshTokenStore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record already exists")]
    Duplicate,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// A registered identifier and its bcrypt hash
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredCredential {
    pub id: Uuid,
    pub identifier: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl StoredCredential {
    pub fn new(identifier: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            password_hash: password_hash.into(),
            created_at: Utc::now(),
        }
    }
}

/// A live refresh token, keyed by the SHA-256 digest of the token
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str)
        -> Result<Option<StoredCredential>, StoreError>;

    /// Insert a new credential. Fails with [`StoreError::Duplicate`] if the
    /// identifier is taken.
    async fn insert(&self, credential: StoredCredential) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    /// Remove and return the record if it exists and has not expired at `now`.
    ///
    /// At most one caller can consume a given token.
    async fn consume(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Delete the record. Deleting a missing record is not an error.
    async fn revoke(&self, token_hash: &str) -> Result<(), StoreError>;

    /// Delete every record expired at `now`, returning how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
