//! Server configuration parsed from environment variables.
//!
//! Required (one of):
//! - `IDENTITY_API_URL`: upstream identity service base URL
//! - `IDENTITY_DIRECTORY_PATH`: YAML user directory served in-process
//!
//! Optional:
//! - `PORT`: default 3000
//! - `ROUTE_TABLE_PATH`: YAML route table, built-in portal layout when absent
//! - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_REDIRECT_URI`: Google
//!   sign-in, disabled unless all three are set
//! - `COOKIE_SECURE`: defaults to whether the Google redirect URI is https

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path::PathBuf;
use std::str::FromStr;

use crate::services::google::GoogleConfig;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("no identity source: set IDENTITY_API_URL or IDENTITY_DIRECTORY_PATH")]
    MissingIdentitySource,
    #[error("identity directory: {0}")]
    Directory(#[from] gate::directory::DirectoryError),
    #[error("route table: {0}")]
    RouteTable(#[from] gate::routes::RouteTableError),
    #[error("identity provider: {0}")]
    Provider(#[from] gate::AuthError),
}

/// Where identities come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    Remote(String),
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub identity: IdentitySource,
    pub route_table_path: Option<PathBuf>,
    pub google: Option<GoogleConfig>,
    pub cookie_secure: bool,
}

impl ServerConfig {
    /// Build typed server config from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when `PORT` does not parse or no identity source is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_parse("PORT", DEFAULT_PORT)?;

        let identity = match (env_nonempty("IDENTITY_API_URL"), env_nonempty("IDENTITY_DIRECTORY_PATH")) {
            (Some(url), _) => IdentitySource::Remote(url.trim_end_matches('/').to_owned()),
            (None, Some(path)) => IdentitySource::Directory(PathBuf::from(path)),
            (None, None) => return Err(ConfigError::MissingIdentitySource),
        };

        let google = GoogleConfig::from_env();
        let cookie_secure = env_bool("COOKIE_SECURE")
            .unwrap_or_else(|| google.as_ref().is_some_and(|g| g.redirect_uri.starts_with("https://")));

        Ok(Self {
            port,
            identity,
            route_table_path: env_nonempty("ROUTE_TABLE_PATH").map(PathBuf::from),
            google,
            cookie_secure,
        })
    }
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

pub(crate) fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env_nonempty(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}
