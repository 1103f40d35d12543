//! Auth error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! Only `CredentialsInvalid` is meant for end users. Token failures are
//! absorbed by `AuthSession` (clear token, go unauthenticated), storage
//! failures degrade to "no token", and transport failures are treated as
//! transient while an explicit rejection is authoritative.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// Failures raised by token storage, the identity provider, or boundary validation.
///
/// `Clone` is required because pending operations are shared between callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    CredentialsInvalid,
    #[error("session token expired")]
    TokenExpired,
    #[error("session token invalid")]
    TokenInvalid,
    #[error("token storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("identity provider unreachable: {0}")]
    NetworkUnavailable(String),
    #[error("invalid identity payload: {0}")]
    InvalidIdentity(String),
    #[error("identity provider error: {0}")]
    Upstream(String),
    #[error("superseded by a newer sign-in or sign-out")]
    Superseded,
}

impl AuthError {
    /// The provider explicitly rejected the token; retrying cannot help.
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        matches!(self, AuthError::TokenExpired | AuthError::TokenInvalid)
    }

    /// The failure happened before the provider could answer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::NetworkUnavailable(_))
    }

    /// Message safe to show inline on a login form.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::CredentialsInvalid => "Invalid email or password.",
            AuthError::NetworkUnavailable(_) => "Unable to reach the sign-in service. Please try again.",
            AuthError::TokenExpired | AuthError::TokenInvalid => "Your session has ended. Please sign in again.",
            AuthError::StorageUnavailable(_)
            | AuthError::InvalidIdentity(_)
            | AuthError::Upstream(_)
            | AuthError::Superseded => {
                "Sign-in failed. Please try again."
            }
        }
    }
}
