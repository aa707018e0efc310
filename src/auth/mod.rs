//! Authentication module
//!
//! - Password hashing for the local credential store
//! - Local token issuance and verification (HMAC)
//! - Verification of provider tokens against a published key set
//! - Session management and the access guard

pub mod clock;
mod error;
mod guard;
pub mod janitor;
pub mod jwks;
mod jwt;
mod password;
mod service;
mod verifier;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::AuthError;
pub use guard::{bearer_token, AccessGuard, Principal};
pub use jwks::{KeySetSource, KeySetVerifier};
pub use jwt::{Claims, IssuedToken, TokenError, TokenIssuer};
pub use password::{PasswordError, PasswordHasher, MAX_PASSWORD_BYTES};
pub use service::{AuthService, LocalSessions, Registration, Session, UserProfile};
pub use verifier::TokenVerifier;
