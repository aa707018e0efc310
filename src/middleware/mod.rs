//! Middleware for the gateway API
//!
//! Request tracing, security headers and the authentication extractors.

pub mod auth;
mod security;
mod tracing;

pub use auth::{AuthenticatedUser, BearerToken};
pub use security::{hsts_header, security_headers};
pub use tracing::request_tracing;
