//! Background purge of expired refresh tokens

use std::sync::Arc;
use std::time::Duration;

use super::clock::Clock;
use crate::store::RefreshTokenStore;

/// Delete expired refresh tokens once. Returns how many were removed.
pub async fn purge_once(store: &dyn RefreshTokenStore, clock: &dyn Clock) -> u64 {
    match store.purge_expired(clock.now()).await {
        Ok(0) => 0,
        Ok(purged) => {
            tracing::info!(purged, "Purged expired refresh tokens");
            purged
        }
        Err(e) => {
            tracing::error!("Error purging refresh tokens: {}", e);
            0
        }
    }
}

/// Background job: purge expired refresh tokens every `interval`.
pub async fn refresh_token_janitor(
    store: Arc<dyn RefreshTokenStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting refresh token janitor");

    loop {
        tokio::time::sleep(interval).await;
        purge_once(store.as_ref(), clock.as_ref()).await;
    }
}
