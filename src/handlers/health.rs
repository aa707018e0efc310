//! Service banner and health check

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::db;
use crate::state::AppState;

#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
}

/// GET /
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Salon auth gateway is running".to_string(),
    })
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub auth_mode: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_set: Option<String>,
    pub version: String,
}

/// GET /health
///
/// Reports 503 when the database or the provider key set is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = db::status(state.db_pool.as_ref()).await;

    let verifier = state.access_guard.verifier();
    let (key_set, key_set_ok) = match verifier.key_set_cached().await {
        None => (None, true),
        Some(true) => (Some("cached".to_string()), true),
        Some(false) => match verifier.refresh_key_set().await {
            Ok(()) => (Some("fetched".to_string()), true),
            Err(e) => (Some(format!("error: {}", e)), false),
        },
    };

    let healthy = database.is_healthy() && key_set_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            auth_mode: state.auth_service.mode().to_string(),
            database: database.describe(),
            key_set,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
