//! Appointment routes

use axum::{
    routing::{delete, get},
    Router,
};

use crate::handlers::appointments;
use crate::state::AppState;

pub fn appointment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route("/api/appointments/:id", delete(appointments::delete_appointment))
}
