//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! JSON auth endpoints live under `/api/auth`, the browser OAuth round trip
//! under `/auth/google`, and everything else falls through to the guarded
//! page handler. The edge gate wraps the whole router so protected areas are
//! bounced before any handler (or identity lookup) runs.

pub mod auth;
pub mod pages;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::edge_gate;
use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/google-user", get(auth::google_user))
        .route("/auth/google", get(auth::google_redirect))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/healthz", get(healthz))
        .fallback(pages::page)
        .layer(axum::middleware::from_fn_with_state(state.clone(), edge_gate))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
