//! Static route classification shared by the edge layer and the guard.
//!
//! DESIGN
//! ======
//! Rules are path prefixes matched on segment boundaries (`/admin` covers
//! `/admin` and `/admin/users`, not `/administrators`). The longest matching
//! prefix wins; unmatched paths are public. Tables can be loaded from YAML so
//! deployments can add areas without a rebuild.

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::role::{Role, RoleSet};

pub const LOGIN_PATH: &str = "/login";
pub const LANDING_PATH: &str = "/dashboard";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteClass {
    /// Reachable by anyone.
    Public,
    /// Only for signed-out visitors (login, signup).
    AuthOnly,
    /// Requires a session; a non-empty role set further restricts access.
    Protected(RoleSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RuleKind {
    Public,
    AuthOnly,
    Protected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    pub prefix: String,
    #[serde(rename = "class")]
    kind: RuleKind,
    #[serde(default)]
    pub roles: RoleSet,
}

impl RouteRule {
    #[must_use]
    pub fn public(prefix: &str) -> Self {
        Self { prefix: prefix.to_owned(), kind: RuleKind::Public, roles: RoleSet::new() }
    }

    #[must_use]
    pub fn auth_only(prefix: &str) -> Self {
        Self { prefix: prefix.to_owned(), kind: RuleKind::AuthOnly, roles: RoleSet::new() }
    }

    #[must_use]
    pub fn protected(prefix: &str, roles: impl Into<RoleSet>) -> Self {
        Self { prefix: prefix.to_owned(), kind: RuleKind::Protected, roles: roles.into() }
    }

    #[must_use]
    pub fn class(&self) -> RouteClass {
        match self.kind {
            RuleKind::Public => RouteClass::Public,
            RuleKind::AuthOnly => RouteClass::AuthOnly,
            RuleKind::Protected => RouteClass::Protected(self.roles.clone()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteTableError {
    #[error("failed to read route table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse route table: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("route prefix must start with '/': {0:?}")]
    InvalidPrefix(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTable {
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
    #[serde(default = "default_unauthorized_path")]
    pub unauthorized_path: String,
    pub rules: Vec<RouteRule>,
}

fn default_login_path() -> String {
    LOGIN_PATH.to_owned()
}

fn default_landing_path() -> String {
    LANDING_PATH.to_owned()
}

fn default_unauthorized_path() -> String {
    UNAUTHORIZED_PATH.to_owned()
}

impl Default for RouteTable {
    /// Portal layout: one area per role, a role-agnostic dashboard, and the
    /// signed-out pages.
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            landing_path: default_landing_path(),
            unauthorized_path: default_unauthorized_path(),
            rules: vec![
                RouteRule::protected("/dashboard", RoleSet::new()),
                RouteRule::protected("/admin", [Role::Admin]),
                RouteRule::protected("/tutor", [Role::Tutor]),
                RouteRule::protected("/parent", [Role::Parent]),
                RouteRule::protected("/student", [Role::Student]),
                RouteRule::auth_only("/login"),
                RouteRule::auth_only("/signup"),
                RouteRule::auth_only("/forgot-password"),
            ],
        }
    }
}

impl RouteTable {
    /// Parse a YAML table.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML or a prefix not starting with `/`.
    pub fn from_yaml(raw: &str) -> Result<Self, RouteTableError> {
        let table: RouteTable = serde_yaml::from_str(raw)?;
        if let Some(bad) = table.rules.iter().find(|r| !r.prefix.starts_with('/')) {
            return Err(RouteTableError::InvalidPrefix(bad.prefix.clone()));
        }
        Ok(table)
    }

    /// Load a YAML table from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, RouteTableError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Classify a request path. Query strings and fragments are ignored.
    #[must_use]
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = strip_query(path);
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.prefix.trim_end_matches('/').len())
            .map_or(RouteClass::Public, RouteRule::class)
    }

    /// Landing path for a signed-in user: their first role's area if the
    /// table has one, otherwise the shared dashboard.
    #[must_use]
    pub fn landing_for(&self, roles: &RoleSet) -> String {
        roles
            .primary()
            .map(|role| format!("/{role}"))
            .filter(|area| match self.classify(area) {
                RouteClass::Protected(required) => required.is_empty() || required.intersects(roles),
                _ => false,
            })
            .unwrap_or_else(|| self.landing_path.clone())
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Accept `next` only if it is a local absolute path, guarding against open
/// redirects such as `//evil.example` or `https://evil.example`.
///
/// Browsers drop tabs and newlines while parsing a URL, so `/\t/evil.example`
/// reads as `//evil.example`. Any control character or whitespace rejects.
#[must_use]
pub fn sanitize_return_path(next: Option<&str>) -> Option<&str> {
    let next = next?;
    if next.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return None;
    }
    let local = next.starts_with('/') && !next.starts_with("//") && !next.contains('\\');
    local.then_some(next)
}
