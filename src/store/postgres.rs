//! Postgres-backed stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CredentialStore, RefreshTokenRecord, RefreshTokenStore, StoreError, StoredCredential};

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<StoredCredential>, StoreError> {
        let credential = sqlx::query_as::<_, StoredCredential>(
            r#"
            SELECT id, identifier, password_hash, created_at
            FROM credentials
            WHERE identifier = $1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn insert(&self, credential: StoredCredential) -> Result<(), StoreError> {
        // The unique constraint on identifier settles concurrent registrations.
        sqlx::query(
            r#"
            INSERT INTO credentials (id, identifier, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(credential.id)
        .bind(&credential.identifier)
        .bind(&credential.password_hash)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, subject, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&record.token_hash)
        .bind(&record.subject)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        // DELETE .. RETURNING makes the consume atomic: a concurrent second
        // refresh with the same token finds nothing.
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            DELETE FROM refresh_tokens
            WHERE token_hash = $1
            RETURNING token_hash, subject, expires_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.filter(|r| r.expires_at > now))
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
