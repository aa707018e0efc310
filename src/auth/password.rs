//! Password hashing
//!
//! One-way bcrypt hashing for the local credential store. Each call to
//! [`PasswordHasher::hash`] draws a fresh salt, and verification reads the
//! salt and cost back out of the stored hash.
//!
//! bcrypt only reads the first 72 bytes of its input, so longer passwords
//! are refused outright rather than silently truncated.

use thiserror::Error;

/// Longest password bcrypt hashes without truncation
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("password must be at most {max} bytes")]
    TooLong { max: usize },

    #[error("Password hashing failed: {0}")]
    HashingFailed(String),
}

/// bcrypt-backed hasher.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    /// Create a hasher with an explicit work factor (4..=31).
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a password with a random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::TooLong {
                max: MAX_PASSWORD_BYTES,
            });
        }
        bcrypt::hash(password, self.cost).map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Check a password against a stored hash.
    ///
    /// A mismatch, an unparseable stored hash and a password too long to
    /// have been hashed all yield `false`.
    pub fn verify(&self, password: &str, hashed: &str) -> bool {
        if password.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        match bcrypt::verify(password, hashed) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }
}
