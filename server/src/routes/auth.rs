//! Auth routes: credential login, Google OAuth flow, session introspection.

use axum::Json;
use axum::extract::{FromRef, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use gate::directory::generate_token;
use gate::routes::sanitize_return_path;
use gate::{AuthError, Credentials, OAuthIdentity, OAuthProvider, SessionToken, UserIdentity};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::services::google;
use crate::state::AppState;

pub const COOKIE_NAME: &str = "session_token";
const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";
const OAUTH_NEXT_COOKIE_NAME: &str = "oauth_next";
const GOOGLE_USER_COOKIE_NAME: &str = "google_user";

fn build_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = build_cookie(name, String::new(), secure);
    cookie.set_max_age(Duration::ZERO);
    cookie
}

/// Status for a provider failure surfaced through the API.
pub(crate) fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::CredentialsInvalid | AuthError::TokenExpired | AuthError::TokenInvalid => StatusCode::UNAUTHORIZED,
        AuthError::NetworkUnavailable(_) | AuthError::Upstream(_) | AuthError::InvalidIdentity(_) => {
            StatusCode::BAD_GATEWAY
        }
        AuthError::StorageUnavailable(_) | AuthError::Superseded => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &AuthError) -> Response {
    (auth_error_status(err), Json(serde_json::json!({ "error": err.user_message() }))).into_response()
}

/// Session token from the cookie, or from an `Authorization: Bearer` header
/// for non-browser clients.
pub(crate) fn request_token(jar: &CookieJar, headers: &HeaderMap) -> Option<SessionToken> {
    if let Some(token) = jar.get(COOKIE_NAME).and_then(|c| SessionToken::new(c.value())) {
        return Some(token);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(SessionToken::new)
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user resolved through the identity provider.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: UserIdentity,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = request_token(&jar, &parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;

        let app_state = AppState::from_ref(state);
        let user = app_state.identity.fetch_user(&token).await.map_err(|e| {
            if !e.is_authoritative() {
                tracing::warn!(error = %e, token = %token.fingerprint(), "session lookup failed");
            }
            auth_error_status(&e)
        })?;

        Ok(Self { user })
    }
}

// =============================================================================
// CREDENTIAL HANDLERS
// =============================================================================

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserIdentity,
    /// Where a browser client should land next.
    pub redirect: String,
}

/// `POST /api/auth/login`: exchange credentials, set the session cookie.
pub async fn login(State(state): State<AppState>, jar: CookieJar, Json(credentials): Json<Credentials>) -> Response {
    match state.identity.exchange_credentials(&credentials).await {
        Ok(grant) => {
            tracing::info!(user_id = %grant.user.id, token = %grant.token.fingerprint(), "login succeeded");
            let jar = jar.add(build_cookie(COOKIE_NAME, grant.token.expose().to_owned(), state.cookie_secure));
            let body = LoginResponse {
                token: grant.token.expose().to_owned(),
                redirect: state.routes.landing_for(&grant.user.roles),
                user: grant.user,
            };
            (jar, Json(body)).into_response()
        }
        Err(e) => {
            if e.is_transient() {
                tracing::warn!(error = %e, "login failed");
            }
            error_response(&e)
        }
    }
}

/// `GET /api/auth/me`: return current user.
pub async fn me(auth: AuthUser) -> Json<UserIdentity> {
    Json(auth.user)
}

/// `POST /api/auth/logout`: revoke the session if any, clear cookie.
/// Always succeeds so repeated logouts are harmless.
pub async fn logout(State(state): State<AppState>, jar: CookieJar, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = request_token(&jar, &headers) {
        state.identity.revoke(&token).await;
        tracing::info!(token = %token.fingerprint(), "session revoked");
    }
    let jar = jar.add(expired_cookie(COOKIE_NAME, state.cookie_secure));
    (jar, StatusCode::NO_CONTENT)
}

// =============================================================================
// GOOGLE OAUTH
// =============================================================================

#[derive(Deserialize)]
pub struct GoogleStartQuery {
    next: Option<String>,
}

/// `GET /auth/google`: redirect to Google's consent page.
pub async fn google_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<GoogleStartQuery>,
) -> Response {
    let Some(config) = &state.google else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Google sign-in not configured").into_response();
    };

    let oauth_state = generate_token();
    let mut state_cookie = build_cookie(OAUTH_STATE_COOKIE_NAME, oauth_state.clone(), state.cookie_secure);
    state_cookie.set_max_age(Duration::minutes(10));
    let mut jar = jar.add(state_cookie);

    if let Some(next) = sanitize_return_path(params.next.as_deref()) {
        let mut next_cookie = build_cookie(OAUTH_NEXT_COOKIE_NAME, next.to_owned(), state.cookie_secure);
        next_cookie.set_max_age(Duration::minutes(10));
        jar = jar.add(next_cookie);
    }

    (jar, Redirect::temporary(&config.authorize_url(&oauth_state))).into_response()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Identity details kept briefly after a Google sign-in for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoogleUserCookie {
    pub email: String,
    pub name: Option<String>,
}

impl GoogleUserCookie {
    fn encode(&self) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        out.append_pair("email", &self.email);
        if let Some(name) = &self.name {
            out.append_pair("name", name);
        }
        out.finish()
    }

    fn decode(raw: &str) -> Option<Self> {
        let mut email = None;
        let mut name = None;
        for (k, v) in url::form_urlencoded::parse(raw.as_bytes()) {
            match k.as_ref() {
                "email" => email = Some(v.into_owned()),
                "name" => name = Some(v.into_owned()),
                _ => {}
            }
        }
        Some(Self { email: email.filter(|e| !e.is_empty())?, name })
    }
}

/// `GET /auth/google/callback`: verify state, exchange code, start a portal
/// session, redirect to the saved return path or the user's landing page.
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let Some(config) = &state.google else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Google sign-in not configured").into_response();
    };
    let secure = state.cookie_secure;
    let login_path = state.routes.login_path.clone();

    if let Some(error) = params.error.as_deref() {
        tracing::info!(%error, "google sign-in declined");
        return Redirect::temporary(&format!("{login_path}?error=oauth_declined")).into_response();
    }

    // Verify OAuth CSRF state from cookie.
    let Some(callback_state) = params.state.as_deref() else {
        return (StatusCode::BAD_REQUEST, "missing oauth state").into_response();
    };
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE_NAME)
        .map(Cookie::value)
        .unwrap_or_default();
    if expected_state.is_empty() || expected_state != callback_state {
        return (StatusCode::UNAUTHORIZED, "invalid oauth state").into_response();
    }
    let Some(code) = params.code.as_deref() else {
        return (StatusCode::BAD_REQUEST, "missing authorization code").into_response();
    };

    let access_token = match google::exchange_code(&state.http, config, code).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "oauth code exchange failed");
            return (StatusCode::BAD_GATEWAY, "OAuth code exchange failed").into_response();
        }
    };

    let google_user = match google::fetch_google_user(&state.http, config, &access_token).await {
        Ok(u) => u,
        Err(e) => {
            tracing::error!(error = %e, "google user fetch failed");
            return (StatusCode::BAD_GATEWAY, "Failed to fetch Google profile").into_response();
        }
    };

    let identity = OAuthIdentity {
        provider: OAuthProvider::Google,
        access_token,
        email: google_user.email.clone(),
        name: google_user.name.clone(),
    };
    let grant = match state.identity.exchange_oauth(&identity).await {
        Ok(grant) => grant,
        Err(AuthError::CredentialsInvalid) => {
            return Redirect::temporary(&format!("{login_path}?error=oauth_no_account")).into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "oauth session exchange failed");
            return error_response(&e);
        }
    };
    tracing::info!(user_id = %grant.user.id, token = %grant.token.fingerprint(), "google sign-in succeeded");

    let target = jar
        .get(OAUTH_NEXT_COOKIE_NAME)
        .and_then(|c| sanitize_return_path(Some(c.value())).map(str::to_owned))
        .unwrap_or_else(|| state.routes.landing_for(&grant.user.roles));

    let profile = GoogleUserCookie { email: google_user.email, name: google_user.name };
    let mut profile_cookie = build_cookie(GOOGLE_USER_COOKIE_NAME, profile.encode(), secure);
    profile_cookie.set_max_age(Duration::minutes(5));

    let jar = jar
        .add(build_cookie(COOKIE_NAME, grant.token.expose().to_owned(), secure))
        .add(profile_cookie)
        .add(expired_cookie(OAUTH_STATE_COOKIE_NAME, secure))
        .add(expired_cookie(OAUTH_NEXT_COOKIE_NAME, secure));
    (jar, Redirect::temporary(&target)).into_response()
}

/// `GET /api/auth/google-user`: identity from the most recent Google sign-in.
pub async fn google_user(jar: CookieJar) -> Result<Json<GoogleUserCookie>, StatusCode> {
    jar.get(GOOGLE_USER_COOKIE_NAME)
        .and_then(|c| GoogleUserCookie::decode(c.value()))
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
