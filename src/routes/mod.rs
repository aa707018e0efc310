//! Route definitions for the gateway API

mod appointments;
mod auth;

pub use appointments::appointment_routes;
pub use auth::auth_routes;

use axum::{routing::get, Router};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Assemble every route with tracing and security headers applied.
///
/// CORS and HSTS depend on deployment settings and are layered on by the
/// binary.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(auth_routes())
        .merge(appointment_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
