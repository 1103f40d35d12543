//! In-process identity directory.
//!
//! A YAML-seeded user list plus an in-memory session table, implementing
//! `IdentityProvider` without any network hop. The server uses it when no
//! upstream identity API is configured, and tests use it as a real provider.
//!
//! Passwords are stored as lowercase SHA-256 hex digests; sessions are random
//! 32-byte hex tokens with a fixed lifetime.

#[cfg(test)]
#[path = "directory_test.rs"]
mod tests;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::identity::{Credentials, SessionToken, UserIdentity, bytes_to_hex};
use crate::provider::{IdentityProvider, LoginGrant, OAuthIdentity, OAuthProvider};
use crate::role::RoleSet;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read directory file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse directory file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("duplicate email in directory: {0}")]
    DuplicateEmail(String),
    #[error("invalid directory entry {id}: {reason}")]
    InvalidEntry { id: String, reason: String },
}

/// One account as written in the directory file.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    /// Lowercase hex SHA-256 of the password. Accounts without one can only
    /// sign in through OAuth.
    #[serde(default)]
    pub password_sha256: Option<String>,
    #[serde(default)]
    pub roles: RoleSet,
}

impl DirectoryUser {
    fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
        }
    }
}

#[derive(Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    session_ttl_secs: Option<u64>,
    users: Vec<DirectoryUser>,
}

struct LiveSession {
    user: usize,
    expires_at: Instant,
}

pub struct LocalDirectory {
    users: Vec<DirectoryUser>,
    session_ttl: Duration,
    sessions: Mutex<HashMap<String, LiveSession>>,
}

/// Lowercase hex SHA-256 of `password`, the format `password_sha256` expects.
#[must_use]
pub fn hash_password(password: &str) -> String {
    bytes_to_hex(&Sha256::digest(password.as_bytes()))
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl LocalDirectory {
    /// Build a directory from `users`, validating ids and emails.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError` on an empty id, a malformed email, or two
    /// accounts sharing an email.
    pub fn new(users: Vec<DirectoryUser>) -> Result<Self, DirectoryError> {
        let mut seen = HashMap::new();
        for user in &users {
            if user.id.trim().is_empty() {
                return Err(DirectoryError::InvalidEntry { id: user.id.clone(), reason: "empty id".into() });
            }
            if !crate::identity::is_plausible_email(&user.email) {
                return Err(DirectoryError::InvalidEntry { id: user.id.clone(), reason: "invalid email".into() });
            }
            if seen.insert(normalize_email(&user.email), ()).is_some() {
                return Err(DirectoryError::DuplicateEmail(user.email.clone()));
            }
        }
        Ok(Self { users, session_ttl: DEFAULT_SESSION_TTL, sessions: Mutex::new(HashMap::new()) })
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Parse a directory from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Parse` on malformed YAML, or any error from [`LocalDirectory::new`].
    pub fn from_yaml(text: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = serde_yaml::from_str(text)?;
        let directory = Self::new(file.users)?;
        Ok(match file.session_ttl_secs {
            Some(secs) => directory.with_session_ttl(Duration::from_secs(secs)),
            None => directory,
        })
    }

    /// Load a directory file from disk.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Io` when the file cannot be read, or any parse error.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let text = std::fs::read_to_string(path)?;
        let directory = Self::from_yaml(&text)?;
        tracing::info!(path = %path.display(), users = directory.users.len(), "identity directory loaded");
        Ok(directory)
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn find_by_email(&self, email: &str) -> Option<usize> {
        let wanted = normalize_email(email);
        self.users.iter().position(|u| normalize_email(&u.email) == wanted)
    }

    fn issue(&self, user: usize) -> Result<LoginGrant, AuthError> {
        let raw = generate_token();
        let token = SessionToken::new(raw.clone()).ok_or_else(|| AuthError::Upstream("empty session token".into()))?;
        let now = Instant::now();
        let mut sessions = self.sessions.lock().map_err(|_| AuthError::Upstream("session table poisoned".into()))?;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(raw, LiveSession { user, expires_at: now + self.session_ttl });
        drop(sessions);
        tracing::debug!(user_id = %self.users[user].id, token = %token.fingerprint(), "session issued");
        Ok(LoginGrant { token, user: self.users[user].identity() })
    }
}

#[async_trait::async_trait]
impl IdentityProvider for LocalDirectory {
    async fn exchange_credentials(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError> {
        let Some(idx) = self.find_by_email(&credentials.email) else {
            return Err(AuthError::CredentialsInvalid);
        };
        let Some(expected) = self.users[idx].password_sha256.as_deref() else {
            return Err(AuthError::CredentialsInvalid);
        };
        if !expected.eq_ignore_ascii_case(&hash_password(&credentials.password)) {
            return Err(AuthError::CredentialsInvalid);
        }
        self.issue(idx)
    }

    async fn fetch_user(&self, token: &SessionToken) -> Result<UserIdentity, AuthError> {
        let mut sessions = self.sessions.lock().map_err(|_| AuthError::Upstream("session table poisoned".into()))?;
        let Some(session) = sessions.get(token.expose()) else {
            return Err(AuthError::TokenInvalid);
        };
        if session.expires_at <= Instant::now() {
            sessions.remove(token.expose());
            return Err(AuthError::TokenExpired);
        }
        Ok(self.users[session.user].identity())
    }

    async fn exchange_oauth(&self, identity: &OAuthIdentity) -> Result<LoginGrant, AuthError> {
        match self.find_by_email(&identity.email) {
            Some(idx) => self.issue(idx),
            None => {
                tracing::info!(provider = %identity.provider, "oauth identity has no portal account");
                Err(AuthError::CredentialsInvalid)
            }
        }
    }

    fn authorize_url(&self, provider: OAuthProvider, return_to: &str) -> String {
        let next: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
        format!("/auth/{provider}?next={next}")
    }

    async fn revoke(&self, token: &SessionToken) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(token.expose());
        }
    }
}
