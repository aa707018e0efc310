//! Authentication request and response bodies

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::auth::{UserProfile, MAX_PASSWORD_BYTES};

/// Registration and login body. The identifier may be sent as `identifier`,
/// `email` or `username`.
#[derive(Debug, Deserialize, Validate)]
pub struct CredentialsRequest {
    #[serde(alias = "email", alias = "username")]
    #[validate(length(min = 3, max = 254, message = "Identifier must be 3 to 254 characters"))]
    pub identifier: String,

    #[validate(
        length(min = 6, message = "Password must be at least 6 characters"),
        custom = "password_fits"
    )]
    pub password: String,
}

impl CredentialsRequest {
    /// Strip surrounding whitespace from the identifier. Run before validating.
    pub fn normalized(mut self) -> Self {
        self.identifier = self.identifier.trim().to_string();
        self
    }
}

fn password_fits(password: &str) -> Result<(), ValidationError> {
    if password.len() > MAX_PASSWORD_BYTES {
        let mut err = ValidationError::new("password_too_long");
        err.message = Some("Password must be at most 72 bytes".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user: UserProfile,
    pub pending_verification: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}
