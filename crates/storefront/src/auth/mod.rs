//! Auth provider client.
//!
//! Identity is owned by the managed auth provider. The browser signs in
//! against the provider directly and hands the storefront its access token;
//! the storefront only asks the provider who the token belongs to.

mod error;

pub use error::AuthError;

use emporium_core::UserId;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use crate::config::AuthConfig;

/// A user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Client for the auth provider's user endpoint.
#[derive(Clone)]
pub struct AuthClient {
    client: reqwest::Client,
    user_url: String,
}

impl AuthClient {
    /// Create a new auth provider client.
    ///
    /// # Errors
    ///
    /// Returns error if the anon key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(config.anon_key.expose_secret())
                .map_err(|e| AuthError::Parse(format!("invalid anon key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            user_url: user_url(config.url.as_str()),
        })
    }

    /// Resolve an access token to the user it was issued for.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the provider rejects the token,
    /// or `Http`/`Api`/`Parse` if the provider cannot be reached or answers
    /// unexpectedly.
    #[instrument(skip(self, access_token))]
    pub async fn get_user(&self, access_token: &SecretString) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(&self.user_url)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        parse_user(&body)
    }
}

fn user_url(base: &str) -> String {
    format!("{}/user", base.trim_end_matches('/'))
}

fn parse_user(body: &str) -> Result<AuthUser, AuthError> {
    serde_json::from_str(body).map_err(|e| AuthError::Parse(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_url_tolerates_trailing_slash() {
        assert_eq!(
            user_url("https://auth.example.com/auth/v1/"),
            "https://auth.example.com/auth/v1/user"
        );
        assert_eq!(
            user_url("https://auth.example.com/auth/v1"),
            "https://auth.example.com/auth/v1/user"
        );
    }

    #[test]
    fn test_parse_user_ignores_extra_fields() {
        let body = r#"{
            "id": "6f1c2a7e-0c1d-4f7a-9a51-0d8f5b6e2c11",
            "aud": "authenticated",
            "email": "shopper@example.com",
            "app_metadata": {"provider": "email"}
        }"#;

        let user = parse_user(body).unwrap();
        assert_eq!(
            user.id.to_string(),
            "6f1c2a7e-0c1d-4f7a-9a51-0d8f5b6e2c11"
        );
        assert_eq!(user.email.as_deref(), Some("shopper@example.com"));
    }

    #[test]
    fn test_parse_user_without_email() {
        let user = parse_user(r#"{"id": "6f1c2a7e-0c1d-4f7a-9a51-0d8f5b6e2c11"}"#).unwrap();
        assert!(user.email.is_none());
    }

    #[test]
    fn test_parse_user_rejects_garbage() {
        assert!(matches!(parse_user("<html>"), Err(AuthError::Parse(_))));
    }
}
