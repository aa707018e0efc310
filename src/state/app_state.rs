//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::appointments::AppointmentStore;
use crate::auth::{AccessGuard, AuthService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub access_guard: Arc<AccessGuard>,
    pub appointments: Arc<dyn AppointmentStore>,
    /// `None` when running on in-memory stores
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        auth_service: Arc<AuthService>,
        access_guard: Arc<AccessGuard>,
        appointments: Arc<dyn AppointmentStore>,
        db_pool: Option<PgPool>,
    ) -> Self {
        Self {
            auth_service,
            access_guard,
            appointments,
            db_pool,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<AccessGuard> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.access_guard.clone()
    }
}

impl FromRef<AppState> for Arc<dyn AppointmentStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.appointments.clone()
    }
}
