//! Page fallback with server-side role guarding.
//!
//! The edge gate has already bounced cookie-less requests for protected
//! areas. Here the cookie is resolved into a user and the route guard
//! decides whether the page body is produced at all.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use gate::guard::Guarded;
use gate::{AuthError, AuthSnapshot, AuthStatus, RouteGuard, UserIdentity};

use crate::routes::auth::{COOKIE_NAME, request_token};
use crate::state::AppState;

const SIGNED_OUT_PAGES: &[&str] = &["/", "/signup", "/forgot-password"];

/// Resolve the request's session into a snapshot. A rejected token yields
/// `Unauthenticated` with `stale = true` so the caller can drop the cookie.
///
/// A transient provider failure is returned as an error: the cookie may still
/// be good, and sending the user to the login page would only bounce them back
/// through the edge gate.
async fn resolve_snapshot(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Result<(AuthSnapshot, bool), AuthError> {
    let Some(token) = request_token(jar, headers) else {
        return Ok((AuthSnapshot { status: AuthStatus::Unauthenticated, error: None }, false));
    };
    match state.identity.fetch_user(&token).await {
        Ok(user) => Ok((AuthSnapshot { status: AuthStatus::Authenticated { user, token }, error: None }, false)),
        Err(e) if e.is_authoritative() => Ok((AuthSnapshot { status: AuthStatus::Unauthenticated, error: Some(e) }, true)),
        Err(e) => {
            tracing::warn!(error = %e, token = %token.fingerprint(), "page session lookup failed");
            Err(e)
        }
    }
}

/// Fallback handler for every non-API path.
pub async fn page(State(state): State<AppState>, jar: CookieJar, headers: HeaderMap, uri: Uri) -> Response {
    let path = uri.path();
    let target = uri.path_and_query().map_or(path, |pq| pq.as_str());

    let Some(guard) = RouteGuard::for_path(&state.routes, path) else {
        return public_page(&state, path);
    };

    let (snapshot, stale) = match resolve_snapshot(&state, &jar, &headers).await {
        Ok(resolved) => resolved,
        Err(e) => return unavailable_page(&e),
    };
    let jar = if stale { jar.remove(Cookie::build(COOKIE_NAME).path("/")) } else { jar };

    match guard.apply(&snapshot, target, |user| render_area(path, user)) {
        Guarded::Rendered(html) => (jar, html).into_response(),
        Guarded::Redirect(to) => (jar, Redirect::temporary(&to)).into_response(),
        Guarded::Pending => (jar, shell("Loading", "<p>Loading…</p>")).into_response(),
    }
}

fn unavailable_page(err: &AuthError) -> Response {
    let body = format!("<p>{}</p>", escape_html(err.user_message()));
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, "5")],
        shell("Temporarily unavailable", &body),
    )
        .into_response()
}

fn public_page(state: &AppState, path: &str) -> Response {
    let routes = &state.routes;
    if path == routes.login_path {
        shell("Sign in", "<p>Sign in with your email and password, or continue with Google.</p>").into_response()
    } else if path == routes.unauthorized_path {
        (StatusCode::FORBIDDEN, shell("Unauthorized", "<p>You do not have access to that page.</p>")).into_response()
    } else if SIGNED_OUT_PAGES.contains(&path) {
        shell("Tutoring portal", "").into_response()
    } else {
        (StatusCode::NOT_FOUND, shell("Not found", "<p>Page not found.</p>")).into_response()
    }
}

fn render_area(path: &str, user: &UserIdentity) -> Html<String> {
    let body = format!(
        "<p>Signed in as {} ({}).</p>",
        escape_html(&user.display_name()),
        escape_html(&user.roles.to_string()),
    );
    shell(path, &body)
}

fn shell(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body><h1>{}</h1>{body}</body></html>",
        escape_html(title),
        escape_html(title),
    ))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;
