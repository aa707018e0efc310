use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Booking lifecycle status
pub const STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Appointment {
    pub id: i64,
    pub user_id: String,
    pub appointment_date: DateTime<Utc>,
    pub status: String,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    pub appointment_date: DateTime<Utc>,
    #[validate(length(max = 1000, message = "Comments must be at most 1000 characters"))]
    pub comments: Option<String>,
}
