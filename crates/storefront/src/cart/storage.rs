//! Guest cart key-value storage.
//!
//! The guest cart is a single JSON blob stored under a fixed key. On the
//! server the visitor's `tower-sessions` session plays the role of the
//! browser's local storage: it is scoped to one browser, survives page
//! loads, and carries no owner identity.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tower_sessions::Session;

/// Errors raised by a guest storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The session store failed to load or save.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// The backend is unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Flat key-value interface for guest cart persistence.
///
/// Last write wins; no concurrency control is provided or needed for a
/// single browser session.
#[async_trait]
pub trait GuestStorage: Send + Sync {
    /// Read the raw value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Guest storage backed by the visitor's session.
#[derive(Debug, Clone)]
pub struct SessionGuestStorage {
    session: Session,
}

impl SessionGuestStorage {
    /// Wrap a request's session.
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl GuestStorage for SessionGuestStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        // Read the raw JSON value so a malformed entry is handed to the cart
        // decoder (which fails soft) instead of erroring here.
        let value = self.session.get_value(key).await?;
        Ok(value.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        }))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.session.insert(key, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.session.remove_value(key).await?;
        Ok(())
    }
}
