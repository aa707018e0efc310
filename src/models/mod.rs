//! Request and response bodies for the HTTP API

pub mod auth;
pub use auth::*;

use serde::Serialize;

/// Generic `{success, message}` acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
