//! Session tokens, login credentials and the validated user record.
//!
//! SYSTEM CONTEXT
//! ==============
//! Identity payloads come from an external provider whose JSON shape is not
//! under our control (camelCase or snake_case names, a `roles` list or a
//! single `role`, optionally wrapped in `{ "user": ... }`). `UserIdentity::
//! from_payload` is the only way such a payload becomes a typed user.

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::role::{Role, RoleSet};

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

// =============================================================================
// SESSION TOKEN
// =============================================================================

/// Opaque, non-empty bearer credential.
///
/// `Debug` never prints the secret; use [`SessionToken::fingerprint`] in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap `raw`, returning `None` for an empty or all-whitespace string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self(raw))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars of the SHA-256 digest.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        bytes_to_hex(&digest[..6])
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.fingerprint())
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Email + password pair submitted to the identity provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// USER IDENTITY
// =============================================================================

/// Validated user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub roles: RoleSet,
}

impl UserIdentity {
    /// Validate a loosely-shaped provider payload.
    ///
    /// `id` and `email` are required. Unrecognized role names are logged and
    /// dropped rather than trusted.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidIdentity` when the payload is not an object
    /// or a required field is missing or malformed.
    pub fn from_payload(payload: &Value) -> Result<Self, AuthError> {
        let obj = match payload.get("user") {
            Some(inner @ Value::Object(_)) => inner,
            _ => payload,
        };
        let Value::Object(map) = obj else {
            return Err(AuthError::InvalidIdentity("expected a JSON object".into()));
        };

        let id = match map.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(AuthError::InvalidIdentity("missing user id".into())),
        };

        let email = match map.get("email") {
            Some(Value::String(s)) if is_plausible_email(s) => s.trim().to_owned(),
            _ => return Err(AuthError::InvalidIdentity("missing or malformed email".into())),
        };

        let first_name = string_field(map, &["firstName", "first_name"]);
        let last_name = string_field(map, &["lastName", "last_name"]);
        let roles = roles_field(map, &id)?;

        Ok(Self { id, first_name, last_name, email, roles })
    }

    #[must_use]
    pub fn has_any_role(&self, allowed: &RoleSet) -> bool {
        self.roles.intersects(allowed)
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() { self.email.clone() } else { full.to_owned() }
    }
}

pub(crate) fn is_plausible_email(raw: &str) -> bool {
    let raw = raw.trim();
    let mut parts = raw.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    )
}

fn string_field(map: &serde_json::Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_owned())
        .unwrap_or_default()
}

fn roles_field(map: &serde_json::Map<String, Value>, user_id: &str) -> Result<RoleSet, AuthError> {
    let names: Vec<&Value> = match (map.get("roles"), map.get("role")) {
        (Some(Value::Array(items)), _) => items.iter().collect(),
        (Some(Value::Null) | None, Some(single @ Value::String(_))) => vec![single],
        (Some(Value::Null) | None, Some(Value::Null) | None) => Vec::new(),
        _ => return Err(AuthError::InvalidIdentity("roles must be a list of strings".into())),
    };

    let mut roles = RoleSet::new();
    for name in names {
        let Value::String(name) = name else {
            return Err(AuthError::InvalidIdentity("roles must be a list of strings".into()));
        };
        match name.parse::<Role>() {
            Ok(role) => {
                roles.insert(role);
            }
            Err(e) => tracing::warn!(user_id, error = %e, "dropping unrecognized role"),
        }
    }
    Ok(roles)
}
