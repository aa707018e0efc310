//! Appointment bookings, scoped to the principal that made them.

pub mod model;
pub mod store;

pub use model::*;
pub use store::{AppointmentStore, InMemoryAppointmentStore, PgAppointmentStore};
