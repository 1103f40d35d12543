//! Google OAuth service: authorize URL, code exchange, profile fetch.

#[cfg(test)]
#[path = "google_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};

use crate::config::env_nonempty;

pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Google OAuth configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
}

impl GoogleConfig {
    #[must_use]
    pub fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            authorize_endpoint: GOOGLE_AUTHORIZE_URL.to_owned(),
            token_endpoint: GOOGLE_TOKEN_URL.to_owned(),
            userinfo_endpoint: GOOGLE_USERINFO_URL.to_owned(),
        }
    }

    /// Load from `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_REDIRECT_URI`.
    /// Returns `None` if any are missing (Google sign-in will be disabled).
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let client_id = env_nonempty("GOOGLE_CLIENT_ID")?;
        let client_secret = env_nonempty("GOOGLE_CLIENT_SECRET")?;
        let redirect_uri = env_nonempty("GOOGLE_REDIRECT_URI")?;
        Some(Self::new(&client_id, &client_secret, &redirect_uri))
    }

    /// Build the Google consent-screen URL carrying the CSRF `state`.
    #[must_use]
    pub fn authorize_url(&self, state: &str) -> String {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("state", state)
            .finish();
        format!("{}?{query}", self.authorize_endpoint)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Subset of the OpenID Connect userinfo response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleUser {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("google token exchange failed: {0}")]
    TokenExchange(String),
    #[error("google api error: {0}")]
    Api(String),
    #[error("google account email is not verified")]
    UnverifiedEmail,
}

/// Exchange an authorization code for an access token.
///
/// # Errors
///
/// Returns `GoogleError::TokenExchange` on transport failure or an unexpected body.
pub async fn exchange_code(client: &reqwest::Client, config: &GoogleConfig, code: &str) -> Result<String, GoogleError> {
    let resp = client
        .post(&config.token_endpoint)
        .header("Accept", "application/json")
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| GoogleError::TokenExchange(e.to_string()))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| GoogleError::TokenExchange(e.to_string()))?;
    if !status.is_success() {
        return Err(GoogleError::TokenExchange(format!("{status}: {body}")));
    }
    let token_resp: TokenResponse =
        serde_json::from_str(&body).map_err(|_| GoogleError::TokenExchange(format!("unexpected response: {body}")))?;
    Ok(token_resp.access_token)
}

/// Fetch the signed-in Google user's profile. Unverified emails are refused.
///
/// # Errors
///
/// Returns `GoogleError::Api` on transport or status failure, or
/// `GoogleError::UnverifiedEmail` when Google has not verified the address.
pub async fn fetch_google_user(
    client: &reqwest::Client,
    config: &GoogleConfig,
    access_token: &str,
) -> Result<GoogleUser, GoogleError> {
    let resp = client
        .get(&config.userinfo_endpoint)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| GoogleError::Api(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleError::Api(format!("{status}: {body}")));
    }

    let user = resp
        .json::<GoogleUser>()
        .await
        .map_err(|e| GoogleError::Api(e.to_string()))?;
    if !user.email_verified {
        return Err(GoogleError::UnverifiedEmail);
    }
    Ok(user)
}
