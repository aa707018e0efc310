//! Postgres pool, migrations and connectivity status
//!
//! The database is optional outside production: without `DATABASE_URL` the
//! gateway runs on in-memory stores and [`connect`] returns `None`.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    Connect(String),

    #[error("Failed to run migrations: {0}")]
    Migrate(String),
}

/// Open the pool and bring the schema up to date, if a database is configured.
pub async fn connect(config: &Config) -> Result<Option<PgPool>, DbError> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory stores");
        return Ok(None);
    };

    tracing::info!(url = %config.database_url_masked(), "Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect(url)
        .await
        .map_err(|e| DbError::Connect(e.to_string()))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DbError::Migrate(e.to_string()))?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database ready, migrations applied"
    );

    Ok(Some(pool))
}

/// Storage backend as reported by `/health`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseStatus {
    InMemory,
    Connected,
    Unreachable(String),
}

impl DatabaseStatus {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, DatabaseStatus::Unreachable(_))
    }

    pub fn describe(&self) -> String {
        match self {
            DatabaseStatus::InMemory => "in-memory".to_string(),
            DatabaseStatus::Connected => "connected".to_string(),
            DatabaseStatus::Unreachable(e) => format!("error: {}", e),
        }
    }
}

/// Probe the pool with a trivial query.
pub async fn status(pool: Option<&PgPool>) -> DatabaseStatus {
    let Some(pool) = pool else {
        return DatabaseStatus::InMemory;
    };

    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => DatabaseStatus::Connected,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            DatabaseStatus::Unreachable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_pool_reports_in_memory() {
        let status = status(None).await;
        assert_eq!(status, DatabaseStatus::InMemory);
        assert!(status.is_healthy());
        assert_eq!(status.describe(), "in-memory");
    }

    #[test]
    fn test_unreachable_is_unhealthy() {
        let status = DatabaseStatus::Unreachable("connection refused".to_string());
        assert!(!status.is_healthy());
        assert_eq!(status.describe(), "error: connection refused");
    }

    #[tokio::test]
    async fn test_connect_without_url_is_none() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(connect(&config).await.unwrap().is_none());
    }
}
