//! Coarse request classification run before any page renders.
//!
//! Only session *presence* is considered. Token contents and roles are left
//! to the route guard, which runs once the full identity is available.

#[cfg(test)]
#[path = "edge_test.rs"]
mod tests;

use crate::guard::login_redirect;
use crate::routes::{RouteClass, RouteTable, sanitize_return_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeAction {
    Continue,
    Redirect(String),
}

/// Classify one request.
///
/// `path_and_query` is the request target as received; `has_session` is
/// whether a non-empty session cookie was sent.
#[must_use]
pub fn classify_request(table: &RouteTable, path_and_query: &str, has_session: bool) -> EdgeAction {
    match (table.classify(path_and_query), has_session) {
        (RouteClass::Protected(_), false) => EdgeAction::Redirect(login_redirect(&table.login_path, path_and_query)),
        (RouteClass::AuthOnly, true) => {
            let next = query_param(path_and_query, "next");
            let target = sanitize_return_path(next.as_deref()).map_or_else(|| table.landing_path.clone(), str::to_owned);
            EdgeAction::Redirect(target)
        }
        _ => EdgeAction::Continue,
    }
}

fn query_param(path_and_query: &str, key: &str) -> Option<String> {
    let (_, query) = path_and_query.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
