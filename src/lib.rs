//! Salon gateway library
//!
//! Authentication gateway and appointment API for the salon booking app.
//! One trust model is active per process: local credentials with
//! HMAC-signed tokens, or an external identity provider whose tokens are
//! checked against its published key set.

pub mod appointments;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod routes;
pub mod state;
pub mod store;
