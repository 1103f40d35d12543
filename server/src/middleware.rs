//! Edge gate: cookie-presence redirects applied before any handler runs.
//!
//! Only checks that a non-empty `session_token` cookie exists. Whether the
//! token is valid, and whether its roles fit, is left to the page guard.

#[cfg(test)]
#[path = "middleware_test.rs"]
mod tests;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use gate::edge::{EdgeAction, classify_request};

use crate::routes::auth::COOKIE_NAME;
use crate::state::AppState;

pub(crate) fn has_session_cookie(jar: &CookieJar) -> bool {
    jar.get(COOKIE_NAME).is_some_and(|c| !c.value().trim().is_empty())
}

pub async fn edge_gate(State(state): State<AppState>, jar: CookieJar, req: Request, next: Next) -> Response {
    let target = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_owned(), |pq| pq.as_str().to_owned());

    match classify_request(&state.routes, &target, has_session_cookie(&jar)) {
        EdgeAction::Continue => next.run(req).await,
        EdgeAction::Redirect(to) => {
            tracing::debug!(path = %req.uri().path(), %to, "edge redirect");
            Redirect::temporary(&to).into_response()
        }
    }
}
