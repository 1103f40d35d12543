//! Route guard: render, wait, or redirect.
//!
//! SYSTEM CONTEXT
//! ==============
//! The guard is the fine-grained, role-aware check that runs once auth state
//! is known. Decisions are plain values so callers (page handlers, the CLI,
//! a UI shell) choose how to perform the redirect.

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;

use url::form_urlencoded;

use crate::identity::UserIdentity;
use crate::role::RoleSet;
use crate::routes::{LOGIN_PATH, RouteClass, RouteTable, UNAUTHORIZED_PATH};
use crate::session::{AuthSnapshot, AuthStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Auth state not settled yet: show a neutral placeholder, do not redirect.
    Pending,
    Render,
    Redirect(String),
}

/// Decide with the default login and unauthorized paths.
#[must_use]
pub fn decide(status: &AuthStatus, allowed_roles: &RoleSet, requested_path: &str) -> GuardDecision {
    RouteGuard::new(allowed_roles.clone()).decide(status, requested_path)
}

/// Build `login_path?next=<requested_path>`.
#[must_use]
pub fn login_redirect(login_path: &str, requested_path: &str) -> String {
    if requested_path.is_empty() || requested_path == "/" {
        return login_path.to_owned();
    }
    let next: String = form_urlencoded::byte_serialize(requested_path.as_bytes()).collect();
    format!("{login_path}?next={next}")
}

/// Per-area guard configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    /// Empty means any authenticated user.
    pub allowed_roles: RoleSet,
    pub login_path: String,
    pub unauthorized_path: String,
}

/// Result of [`RouteGuard::apply`]: the rendered children only exist when
/// access was granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Pending,
    Rendered(T),
    Redirect(String),
}

impl RouteGuard {
    #[must_use]
    pub fn new(allowed_roles: RoleSet) -> Self {
        Self {
            allowed_roles,
            login_path: LOGIN_PATH.to_owned(),
            unauthorized_path: UNAUTHORIZED_PATH.to_owned(),
        }
    }

    #[must_use]
    pub fn any_authenticated() -> Self {
        Self::new(RoleSet::new())
    }

    /// Guard for a protected path in `table`; `None` if the path is not protected.
    #[must_use]
    pub fn for_path(table: &RouteTable, path: &str) -> Option<Self> {
        match table.classify(path) {
            RouteClass::Protected(roles) => Some(Self {
                allowed_roles: roles,
                login_path: table.login_path.clone(),
                unauthorized_path: table.unauthorized_path.clone(),
            }),
            RouteClass::Public | RouteClass::AuthOnly => None,
        }
    }

    #[must_use]
    pub fn decide(&self, status: &AuthStatus, requested_path: &str) -> GuardDecision {
        match status {
            AuthStatus::Uninitialized | AuthStatus::Loading => GuardDecision::Pending,
            AuthStatus::Unauthenticated => GuardDecision::Redirect(login_redirect(&self.login_path, requested_path)),
            AuthStatus::Authenticated { user, .. } => {
                if self.allows(user) {
                    GuardDecision::Render
                } else {
                    tracing::info!(
                        user_id = %user.id,
                        roles = %user.roles,
                        required = %self.allowed_roles,
                        path = requested_path,
                        "role check denied"
                    );
                    GuardDecision::Redirect(self.unauthorized_path.clone())
                }
            }
        }
    }

    #[must_use]
    pub fn allows(&self, user: &UserIdentity) -> bool {
        self.allowed_roles.is_empty() || user.has_any_role(&self.allowed_roles)
    }

    /// Run `render` only when the snapshot grants access.
    pub fn apply<T>(&self, snapshot: &AuthSnapshot, requested_path: &str, render: impl FnOnce(&UserIdentity) -> T) -> Guarded<T> {
        match (self.decide(&snapshot.status, requested_path), snapshot.user()) {
            (GuardDecision::Render, Some(user)) => Guarded::Rendered(render(user)),
            (GuardDecision::Redirect(to), _) => Guarded::Redirect(to),
            (GuardDecision::Pending | GuardDecision::Render, _) => Guarded::Pending,
        }
    }
}
