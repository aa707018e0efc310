//! API handlers

pub mod appointments;
pub mod auth;
pub mod health;

pub use appointments::*;
pub use auth::*;
pub use health::*;

// Re-export extractors from middleware for handler use
pub use crate::middleware::auth::{AuthenticatedUser, BearerToken};
