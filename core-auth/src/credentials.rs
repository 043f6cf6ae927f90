//! Tracker password storage
//!
//! The password never goes to the settings store. It is kept in the host's
//! [`SecureStore`] under a key derived from the login email, so switching
//! users in the settings does not expose someone else's password.
//!
//! ```no_run
//! use core_auth::CredentialStore;
//! # use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let credentials = CredentialStore::new(secure_store);
//! credentials.store_password("ana@studio.test", "hunter2").await?;
//! let password = credentials.password("ana@studio.test").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "kitsu_password:";

/// Passwords in the platform secure store. Values are never logged.
#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self { secure_store }
    }

    pub async fn store_password(&self, username: &str, password: &str) -> Result<()> {
        let key = storage_key(username);
        self.secure_store
            .set_secret(&key, password.as_bytes())
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to store password in secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!("Password stored securely");
        Ok(())
    }

    /// `Ok(None)` when nothing is stored. Bytes that are not UTF-8 are
    /// deleted and reported as corrupted.
    pub async fn password(&self, username: &str) -> Result<Option<String>> {
        let key = storage_key(username);
        let data = self.secure_store.get_secret(&key).await.map_err(|e| {
            warn!(error = %e, "Failed to read password from secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!("No password stored");
            return Ok(None);
        };

        match String::from_utf8(data) {
            Ok(password) => Ok(Some(password)),
            Err(e) => {
                warn!(error = %e, "Stored password is not valid UTF-8, removing it");
                if let Err(delete_err) = self.secure_store.delete_secret(&key).await {
                    warn!(error = %delete_err, "Failed to delete corrupted password");
                }
                Err(AuthError::CredentialCorrupted {
                    username: username.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Idempotent.
    pub async fn delete_password(&self, username: &str) -> Result<()> {
        self.secure_store
            .delete_secret(&storage_key(username))
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to delete password from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!("Password deleted");
        Ok(())
    }

    pub async fn has_password(&self, username: &str) -> Result<bool> {
        self.secure_store
            .has_secret(&storage_key(username))
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }
}

/// Emails are case-insensitive at login, so the key is too.
fn storage_key(username: &str) -> String {
    format!("{}{}", KEY_PREFIX, username.trim().to_lowercase())
}
