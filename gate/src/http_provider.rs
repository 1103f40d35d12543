//! `IdentityProvider` over HTTP.
//!
//! Talks to any service exposing the `/api/auth/*` surface: the upstream
//! identity API when used by the server, or the portal server itself when
//! used by the CLI.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures (connect, timeout, body read) map to
//! `NetworkUnavailable`; explicit 401/403 answers are authoritative and map to
//! credential or token errors; anything else is `Upstream`.

#[cfg(test)]
#[path = "http_provider_test.rs"]
mod tests;

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::error::AuthError;
use crate::identity::{Credentials, SessionToken, UserIdentity};
use crate::provider::{IdentityProvider, LoginGrant, OAuthIdentity, OAuthProvider};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Paths appended to the provider base URL.
#[derive(Debug, Clone)]
pub struct IdentityEndpoints {
    pub login: String,
    pub me: String,
    pub logout: String,
    /// `{provider}` is replaced with the provider name.
    pub oauth_exchange: String,
    /// `{provider}` is replaced with the provider name.
    pub authorize: String,
}

impl Default for IdentityEndpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/login".into(),
            me: "/api/auth/me".into(),
            logout: "/api/auth/logout".into(),
            oauth_exchange: "/api/auth/oauth/{provider}".into(),
            authorize: "/auth/{provider}".into(),
        }
    }
}

pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    endpoints: IdentityEndpoints,
}

impl HttpIdentityProvider {
    /// Build a provider rooted at `base_url` with default endpoints.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Upstream` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, AuthError> {
        Self::with_endpoints(base_url, IdentityEndpoints::default())
    }

    /// Build a provider with custom endpoint paths.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Upstream` if the HTTP client cannot be built.
    pub fn with_endpoints(base_url: &str, endpoints: IdentityEndpoints) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Upstream(e.to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned(), endpoints })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn provider_path(template: &str, provider: OAuthProvider) -> String {
        template.replace("{provider}", provider.as_str())
    }

    async fn read_grant(resp: reqwest::Response) -> Result<LoginGrant, AuthError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(login_status_error(status));
        }
        let body: Value = resp.json().await.map_err(transport_error)?;
        parse_grant(&body)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_credentials(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError> {
        let resp = self
            .client
            .post(self.url(&self.endpoints.login))
            .json(credentials)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_grant(resp).await
    }

    async fn fetch_user(&self, token: &SessionToken) -> Result<UserIdentity, AuthError> {
        let resp = self
            .client
            .get(self.url(&self.endpoints.me))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(token_status_error(status));
        }
        let body: Value = resp.json().await.map_err(transport_error)?;
        UserIdentity::from_payload(&body)
    }

    async fn exchange_oauth(&self, identity: &OAuthIdentity) -> Result<LoginGrant, AuthError> {
        let path = Self::provider_path(&self.endpoints.oauth_exchange, identity.provider);
        let resp = self
            .client
            .post(self.url(&path))
            .json(identity)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_grant(resp).await
    }

    fn authorize_url(&self, provider: OAuthProvider, return_to: &str) -> String {
        let path = Self::provider_path(&self.endpoints.authorize, provider);
        let next: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
        format!("{}?next={next}", self.url(&path))
    }

    async fn revoke(&self, token: &SessionToken) {
        let result = self
            .client
            .post(self.url(&self.endpoints.logout))
            .bearer_auth(token.expose())
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, token = %token.fingerprint(), "session revoke failed");
        }
    }
}

fn transport_error(e: reqwest::Error) -> AuthError {
    AuthError::NetworkUnavailable(e.to_string())
}

fn login_status_error(status: StatusCode) -> AuthError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AuthError::CredentialsInvalid,
        _ => AuthError::Upstream(format!("login failed: {status}")),
    }
}

fn token_status_error(status: StatusCode) -> AuthError {
    match status {
        StatusCode::UNAUTHORIZED => AuthError::TokenExpired,
        StatusCode::FORBIDDEN => AuthError::TokenInvalid,
        _ => AuthError::Upstream(format!("user fetch failed: {status}")),
    }
}

/// Parse `{ "token": ..., "user": {...} }`. `accessToken` is accepted as an
/// alias and the user may also be inlined at the top level.
fn parse_grant(body: &Value) -> Result<LoginGrant, AuthError> {
    let token = ["token", "accessToken", "access_token"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .and_then(SessionToken::new)
        .ok_or_else(|| AuthError::InvalidIdentity("login response missing token".into()))?;
    let user = UserIdentity::from_payload(body)?;
    Ok(LoginGrant { token, user })
}
