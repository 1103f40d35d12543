//! # gate
//!
//! Role-based access gating for the tutoring portal.
//!
//! ARCHITECTURE
//! ============
//! Leaf-first:
//! - `token_store`: durable storage for the opaque session token.
//! - `session`: the per-client auth state machine (`AuthSession`).
//! - `guard`: pure render/redirect decisions for protected areas.
//! - `edge`: coarse, cookie-presence request classification.
//!
//! `routes` holds the static route table shared by `guard` and `edge`;
//! `provider`, `http_provider` and `directory` describe and implement the
//! external identity collaborator.

pub mod directory;
pub mod edge;
pub mod error;
pub mod guard;
pub mod http_provider;
pub mod identity;
pub mod provider;
pub mod role;
pub mod routes;
pub mod session;
pub mod token_store;

pub use error::AuthError;
pub use guard::{GuardDecision, RouteGuard, decide};
pub use identity::{Credentials, SessionToken, UserIdentity};
pub use provider::{IdentityProvider, LoginGrant, OAuthIdentity, OAuthProvider};
pub use role::{Role, RoleSet};
pub use routes::{RouteClass, RouteTable};
pub use session::{AuthSession, AuthSnapshot, AuthStatus, RetryPolicy};
pub use token_store::TokenStore;
