//! Supabase (GoTrue) REST client

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{IdentityProvider, ProviderError, ProviderSession, ProviderUser, SignUpOutcome};
use crate::auth::jwks::KeySetSource;
use crate::config::ProviderConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Message fields GoTrue uses for errors, in order of preference.
const ERROR_MESSAGE_FIELDS: [&str; 4] = ["msg", "error_description", "message", "error"];

/// HTTP client for the Supabase auth API.
#[derive(Clone)]
pub struct SupabaseClient {
    base_url: String,
    api_key: String,
    jwks_url: String,
    client: Client,
}

impl SupabaseClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            jwks_url: config.jwks_url.clone(),
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.endpoint(path))
            .header("apikey", &self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Identity provider request failed");
            ProviderError::unavailable(format!("Identity provider unreachable: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_reply(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ProviderError::unavailable(format!("Unexpected provider reply: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<SignUpOutcome, ProviderError> {
        let request = self
            .post("signup")
            .json(&json!({ "email": identifier, "password": secret }));
        let reply: Value = self.send_json(request).await?;
        parse_sign_up(reply)
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<ProviderSession, ProviderError> {
        let request = self
            .post("token?grant_type=password")
            .json(&json!({ "email": identifier, "password": secret }));
        self.send_json(request).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError> {
        let request = self
            .post("token?grant_type=refresh_token")
            .json(&json!({ "refresh_token": refresh_token }));
        self.send_json(request).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let request = self.post("logout").bearer_auth(access_token);
        self.send(request).await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        let request = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token);
        self.send_json(request).await
    }
}

#[async_trait]
impl KeySetSource for SupabaseClient {
    async fn fetch_key_set(&self) -> Result<JwkSet, ProviderError> {
        let request = self.client.get(&self.jwks_url).header("apikey", &self.api_key);

        // Any failure to obtain the key set is transient from the caller's view.
        self.send_json::<JwkSet>(request).await.map_err(|e| {
            tracing::warn!(error = %e, url = %self.jwks_url, "Failed to fetch key set");
            ProviderError::unavailable(e.message)
        })
    }
}

/// Classify a non-success reply.
fn error_from_reply(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ERROR_MESSAGE_FIELDS.iter().find_map(|field| {
                value
                    .get(*field)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| format!("Identity provider returned HTTP {}", status.as_u16()));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::unavailable(message)
    } else {
        ProviderError::rejected(message)
    }
}

/// Sign-up replies carry either a bare user (confirmation pending) or a
/// full session with the user embedded.
fn parse_sign_up(reply: Value) -> Result<SignUpOutcome, ProviderError> {
    if reply.get("access_token").is_some() {
        let session: ProviderSession = serde_json::from_value(reply)
            .map_err(|e| ProviderError::unavailable(format!("Unexpected sign-up reply: {}", e)))?;
        let user = session
            .user
            .clone()
            .ok_or_else(|| ProviderError::rejected("User was not created"))?;
        return Ok(SignUpOutcome {
            user,
            session: Some(session),
        });
    }

    let user_value = match reply.get("user") {
        Some(user) if !user.is_null() => user.clone(),
        _ => reply,
    };

    match serde_json::from_value::<ProviderUser>(user_value) {
        Ok(user) => Ok(SignUpOutcome {
            user,
            session: None,
        }),
        Err(_) => Err(ProviderError::rejected("User was not created")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorKind;

    #[test]
    fn test_error_message_preference() {
        let err = error_from_reply(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(err.kind, ProviderErrorKind::Rejected);
        assert_eq!(err.message, "Invalid login credentials");

        let err = error_from_reply(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":422,"msg":"User already registered"}"#,
        );
        assert_eq!(err.message, "User already registered");
    }

    #[test]
    fn test_error_classification() {
        assert!(error_from_reply(StatusCode::BAD_GATEWAY, "").is_unavailable());
        assert!(error_from_reply(StatusCode::TOO_MANY_REQUESTS, "{}").is_unavailable());
        assert!(!error_from_reply(StatusCode::UNAUTHORIZED, "{}").is_unavailable());
    }

    #[test]
    fn test_error_without_body_falls_back_to_status() {
        let err = error_from_reply(StatusCode::FORBIDDEN, "<html>nope</html>");
        assert_eq!(err.message, "Identity provider returned HTTP 403");
    }

    #[test]
    fn test_parse_sign_up_pending_confirmation() {
        let outcome = parse_sign_up(json!({
            "id": "8d6f6b1e-0000-4000-8000-000000000001",
            "email": "alice@example.com",
            "role": "authenticated"
        }))
        .unwrap();
        assert_eq!(outcome.user.email.as_deref(), Some("alice@example.com"));
        assert!(outcome.session.is_none());
    }

    #[test]
    fn test_parse_sign_up_with_session() {
        let outcome = parse_sign_up(json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "user": { "id": "u-1", "email": "alice@example.com" }
        }))
        .unwrap();
        assert_eq!(outcome.user.id, "u-1");
        let session = outcome.session.unwrap();
        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.expires_in, Some(3600));
    }

    #[test]
    fn test_parse_sign_up_without_user_is_rejected() {
        let err = parse_sign_up(json!({ "user": null })).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Rejected);
    }
}
