//! Appointment handlers. Every route acts on the caller's own bookings.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use super::AuthenticatedUser;
use crate::appointments::{Appointment, CreateAppointmentRequest};
use crate::error::ApiError;
use crate::models::MessageResponse;
use crate::state::AppState;
use crate::store::StoreError;

/// GET /api/appointments
pub async fn list_appointments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let appointments = state
        .appointments
        .list_for_user(&user.principal.subject)
        .await?;

    Ok(Json(appointments))
}

/// POST /api/appointments
pub async fn create_appointment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    req.validate()?;

    let appointment = state
        .appointments
        .create(&user.principal.subject, &req)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => {
                ApiError::Conflict("This time slot is already booked".to_string())
            }
            other => other.into(),
        })?;

    tracing::info!(appointment_id = appointment.id, "Appointment booked");

    Ok((StatusCode::CREATED, Json(appointment)))
}

/// DELETE /api/appointments/:id
pub async fn delete_appointment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state
        .appointments
        .delete_for_user(id, &user.principal.subject)
        .await?;

    // Someone else's booking is reported exactly like a missing one.
    if !deleted {
        return Err(ApiError::NotFound("Appointment not found".to_string()));
    }

    Ok(Json(MessageResponse::ok("Appointment cancelled successfully.")))
}
