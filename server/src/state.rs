//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the identity provider every session check goes through, the
//! route table shared by the edge gate and the page guard, and the optional
//! Google OAuth config.

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;

use std::sync::Arc;

use gate::directory::LocalDirectory;
use gate::http_provider::HttpIdentityProvider;
use gate::{IdentityProvider, RouteTable};

use crate::config::{ConfigError, IdentitySource, ServerConfig};
use crate::services::google::GoogleConfig;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub routes: Arc<RouteTable>,
    /// `None` if Google env vars are not configured.
    pub google: Option<Arc<GoogleConfig>>,
    /// Outbound client for Google token and profile calls.
    pub http: reqwest::Client,
    pub cookie_secure: bool,
}

impl AppState {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, routes: RouteTable) -> Self {
        Self { identity, routes: Arc::new(routes), google: None, http: reqwest::Client::new(), cookie_secure: false }
    }

    #[must_use]
    pub fn with_google(mut self, google: GoogleConfig) -> Self {
        self.google = Some(Arc::new(google));
        self
    }

    /// Build state from config, loading the route table and identity source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the directory or route table file cannot be
    /// loaded, or the HTTP provider cannot be built.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let identity: Arc<dyn IdentityProvider> = match &config.identity {
            IdentitySource::Remote(url) => {
                tracing::info!(%url, "using remote identity provider");
                Arc::new(HttpIdentityProvider::new(url)?)
            }
            IdentitySource::Directory(path) => Arc::new(LocalDirectory::load(path)?),
        };

        let routes = match &config.route_table_path {
            Some(path) => {
                let table = RouteTable::load(path)?;
                tracing::info!(path = %path.display(), rules = table.rules.len(), "route table loaded");
                table
            }
            None => RouteTable::default(),
        };

        let mut state = Self::new(identity, routes);
        if let Some(google) = &config.google {
            state = state.with_google(google.clone());
        }
        state.cookie_secure = config.cookie_secure;
        Ok(state)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
