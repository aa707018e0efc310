use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;

use super::model::{Appointment, CreateAppointmentRequest, STATUS_PENDING};
use crate::store::StoreError;

/// Appointment persistence. Every operation is scoped to one owner.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Appointment>, StoreError>;

    /// Book a slot. Fails with [`StoreError::Duplicate`] when the slot is taken.
    async fn create(
        &self,
        user_id: &str,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, StoreError>;

    /// Delete the appointment if it exists and belongs to `user_id`.
    /// Returns whether anything was deleted.
    async fn delete_for_user(&self, id: i64, user_id: &str) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgAppointmentStore {
    db_pool: PgPool,
}

impl PgAppointmentStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Appointment>, StoreError> {
        let appointments = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT id, user_id, appointment_date, status, comments, created_at, updated_at
            FROM appointments
            WHERE user_id = $1
            ORDER BY appointment_date ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(appointments)
    }

    async fn create(
        &self,
        user_id: &str,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, StoreError> {
        let appointment = sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments (user_id, appointment_date, status, comments)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, appointment_date, status, comments, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(request.appointment_date)
        .bind(STATUS_PENDING)
        .bind(&request.comments)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(appointment)
    }

    async fn delete_for_user(&self, id: i64, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAppointmentStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    appointments: Vec<Appointment>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Appointment>, StoreError> {
        let inner = self.inner.read().await;
        let mut appointments: Vec<Appointment> = inner
            .appointments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.appointment_date);
        Ok(appointments)
    }

    async fn create(
        &self,
        user_id: &str,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .appointments
            .iter()
            .any(|a| a.appointment_date == request.appointment_date)
        {
            return Err(StoreError::Duplicate);
        }

        inner.next_id += 1;
        let now = Utc::now();
        let appointment = Appointment {
            id: inner.next_id,
            user_id: user_id.to_string(),
            appointment_date: request.appointment_date,
            status: STATUS_PENDING.to_string(),
            comments: request.comments.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn delete_for_user(&self, id: i64, user_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.appointments.len();
        inner
            .appointments
            .retain(|a| !(a.id == id && a.user_id == user_id));
        Ok(inner.appointments.len() < before)
    }
}
