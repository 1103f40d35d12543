//! Identity provider seam.
//!
//! The portal never verifies passwords or decodes tokens itself; it forwards
//! to whichever provider is injected (`HttpIdentityProvider` in production,
//! `LocalDirectory` in development and tests).

use std::fmt;

use serde::Serialize;

use crate::error::AuthError;
use crate::identity::{Credentials, SessionToken, UserIdentity};

/// Successful sign-in: a fresh token plus the user it belongs to.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub token: SessionToken,
    pub user: UserIdentity,
}

/// External OAuth providers the portal can delegate sign-in to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External identity verified by the server during an OAuth callback.
#[derive(Debug, Clone, Serialize)]
pub struct OAuthIdentity {
    pub provider: OAuthProvider,
    /// Provider-issued access token, forwarded so the identity service can re-verify.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// `CredentialsInvalid` on rejection, `NetworkUnavailable` on transport failure.
    async fn exchange_credentials(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError>;

    /// Resolve the user behind `token`.
    ///
    /// # Errors
    ///
    /// `TokenExpired`/`TokenInvalid` when the provider rejects the token.
    async fn fetch_user(&self, token: &SessionToken) -> Result<UserIdentity, AuthError>;

    /// Exchange a verified OAuth identity for a session.
    ///
    /// # Errors
    ///
    /// `CredentialsInvalid` when no portal account matches the external identity.
    async fn exchange_oauth(&self, identity: &OAuthIdentity) -> Result<LoginGrant, AuthError>;

    /// URL that starts the OAuth redirect flow, returning to `return_to` afterwards.
    fn authorize_url(&self, provider: OAuthProvider, return_to: &str) -> String;

    /// Invalidate `token` server-side. Best-effort; the default does nothing.
    async fn revoke(&self, token: &SessionToken) {
        let _ = token;
    }
}
