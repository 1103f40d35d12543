use axum::body::Body;
use axum::http::{Request, header};
use std::sync::Arc;

use gate::{AuthError, Credentials, IdentityProvider, LoginGrant, OAuthIdentity, OAuthProvider, RouteTable, SessionToken};
use tower::ServiceExt;

use super::*;
use crate::state::test_helpers::{ADMIN_EMAIL, PASSWORD, TUTOR_EMAIL, test_app_state};

async fn get(state: &AppState, uri: &str, cookie: Option<&str>) -> Response {
    let mut req = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    crate::routes::app(state.clone())
        .oneshot(req.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(resp: &Response) -> &str {
    resp.headers().get(header::LOCATION).unwrap().to_str().unwrap()
}

async fn session_cookie(state: &AppState, email: &str) -> String {
    let grant = state
        .identity
        .exchange_credentials(&Credentials::new(email, PASSWORD))
        .await
        .unwrap();
    format!("{COOKIE_NAME}={}", grant.token.expose())
}

/// Provider that cannot be reached.
struct OfflineProvider;

#[async_trait::async_trait]
impl IdentityProvider for OfflineProvider {
    async fn exchange_credentials(&self, _credentials: &Credentials) -> Result<LoginGrant, AuthError> {
        Err(AuthError::NetworkUnavailable("connection refused".into()))
    }

    async fn fetch_user(&self, _token: &SessionToken) -> Result<UserIdentity, AuthError> {
        Err(AuthError::NetworkUnavailable("connection refused".into()))
    }

    async fn exchange_oauth(&self, _identity: &OAuthIdentity) -> Result<LoginGrant, AuthError> {
        Err(AuthError::NetworkUnavailable("connection refused".into()))
    }

    fn authorize_url(&self, provider: OAuthProvider, _return_to: &str) -> String {
        format!("/auth/{provider}")
    }
}

#[test]
fn escape_html_neutralises_markup() {
    assert_eq!(escape_html("<b>\"Tom\" & 'Jerry'</b>"), "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;");
}

#[tokio::test]
async fn matching_role_renders_area() {
    let state = test_app_state();
    let cookie = session_cookie(&state, TUTOR_EMAIL).await;
    let resp = get(&state, "/tutor/calendar", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Signed in as Tina Tutor (tutor)"));
}

#[tokio::test]
async fn wrong_role_redirects_to_unauthorized_without_body() {
    let state = test_app_state();
    let cookie = session_cookie(&state, TUTOR_EMAIL).await;
    let resp = get(&state, "/admin/users", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&resp), "/unauthorized");
    assert!(!body_text(resp).await.contains("Signed in"));
}

#[tokio::test]
async fn dashboard_accepts_any_role() {
    let state = test_app_state();
    for email in [TUTOR_EMAIL, ADMIN_EMAIL] {
        let cookie = session_cookie(&state, email).await;
        assert_eq!(get(&state, "/dashboard", Some(&cookie)).await.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn stale_cookie_redirects_to_login_and_clears_cookie() {
    let state = test_app_state();
    let resp = get(&state, "/dashboard?tab=week", Some("session_token=revoked")).await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&resp), "/login?next=%2Fdashboard%3Ftab%3Dweek");
    let cleared = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with("session_token=") && v.contains("Max-Age=0"));
    assert!(cleared);
}

#[tokio::test]
async fn public_pages_render_and_unknown_is_not_found() {
    let state = test_app_state();
    assert_eq!(get(&state, "/", None).await.status(), StatusCode::OK);
    assert_eq!(get(&state, "/login", None).await.status(), StatusCode::OK);
    assert_eq!(get(&state, "/unauthorized", None).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(get(&state, "/nowhere", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provider_outage_serves_unavailable_instead_of_login_redirect() {
    let state = AppState::new(Arc::new(OfflineProvider), RouteTable::default());
    let resp = get(&state, "/dashboard", Some("session_token=abc")).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(resp.headers().get(header::LOCATION).is_none());
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
    assert!(body_text(resp).await.contains("Unable to reach the sign-in service"));
}
