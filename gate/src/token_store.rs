//! Durable storage for the session token.
//!
//! DESIGN
//! ======
//! `load` never fails: inaccessible storage reads as "no token" so callers
//! degrade to unauthenticated instead of erroring. `save` reports
//! `StorageUnavailable` so the session can log it, and `clear` is best-effort
//! and idempotent.
//!
//! Backends:
//! - `MemoryTokenStore`: process-local cell.
//! - `FileTokenStore`: JSON file, the CLI's equivalent of browser storage.
//! - `DetachedTokenStore`: server rendering context with no client storage.

#[cfg(test)]
#[path = "token_store_test.rs"]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Single shared token cell. Writes are last-writer-wins.
pub trait TokenStore: Send + Sync {
    /// Persist `token`, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageUnavailable` if the backing store cannot be written.
    fn save(&self, token: &str) -> Result<(), AuthError>;

    /// The persisted token, or `None` if absent, empty, or unreadable.
    fn load(&self) -> Option<String>;

    /// Remove the persisted token. Safe to call repeatedly.
    fn clear(&self);
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Mutex::new(Some(token.into())) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, token: &str) -> Result<(), AuthError> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| AuthError::StorageUnavailable("token cell poisoned".into()))?;
        *slot = Some(token.to_owned());
        Ok(())
    }

    fn load(&self) -> Option<String> {
        let slot = self.token.lock().ok()?;
        slot.clone().filter(|t| !t.is_empty())
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
    }
}

// =============================================================================
// FILE
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    token: String,
}

/// Token persisted as `{"token": "..."}` at a fixed path.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, token: &str) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
        }
        let raw = serde_json::to_string(&StoredToken { token: token.to_owned() })
            .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| AuthError::StorageUnavailable(e.to_string()))
    }

    fn load(&self) -> Option<String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "token file unreadable");
                return None;
            }
        };
        match serde_json::from_str::<StoredToken>(&raw) {
            Ok(stored) if !stored.token.is_empty() => Some(stored.token),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "token file malformed");
                None
            }
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "token file not removed"),
        }
    }
}

// =============================================================================
// DETACHED
// =============================================================================

/// Store used where no client storage exists (server-side rendering).
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedTokenStore;

impl TokenStore for DetachedTokenStore {
    fn save(&self, _token: &str) -> Result<(), AuthError> {
        Err(AuthError::StorageUnavailable("no client storage in this context".into()))
    }

    fn load(&self) -> Option<String> {
        None
    }

    fn clear(&self) {}
}
