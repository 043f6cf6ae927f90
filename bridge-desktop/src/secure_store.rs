//! Credential storage in the OS keychain

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::{debug, error};

pub const DEFAULT_SERVICE_NAME: &str = "prism-kitsu";

/// Keyring-backed [`SecureStore`]
///
/// Uses Keychain on macOS, Credential Manager on Windows and Secret Service
/// on Linux. Values are base64 encoded because keyrings hold strings.
///
/// The keyring cannot enumerate entries, so `clear_all` removes the keys
/// this instance has touched plus any registered with [`Self::tracking`].
pub struct KeyringSecureStore {
    service_name: String,
    known_keys: Mutex<BTreeSet<String>>,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            known_keys: Mutex::new(BTreeSet::new()),
        }
    }

    /// Register keys that `clear_all` must remove.
    pub fn tracking<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut known) = self.known_keys.lock() {
            known.extend(keys.into_iter().map(Into::into));
        }
        self
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        if let Ok(mut known) = self.known_keys.lock() {
            known.insert(key.to_string());
        }
        Entry::new(&self.service_name, key).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::OperationFailed(format!("Keyring error: {}", e))
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entry(key)?
            .set_password(&STANDARD.encode(value))
            .map_err(Self::map_keyring_error)?;

        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entry(key)?.get_password() {
            Ok(encoded) => {
                let decoded = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    error!(key = key, error = %e, "Failed to decode secret");
                    BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
                })?;
                Ok(Some(decoded))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(key = key, "Deleted secret from keyring");
                Ok(())
            }
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn clear_all(&self) -> Result<()> {
        let keys: Vec<String> = match self.known_keys.lock() {
            Ok(known) => known.iter().cloned().collect(),
            Err(_) => {
                return Err(BridgeError::OperationFailed(
                    "keyring key index poisoned".to_string(),
                ))
            }
        };
        for key in keys {
            self.delete_secret(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let store = KeyringSecureStore::default();
        assert_eq!(store.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn test_tracking_registers_keys() {
        let store = KeyringSecureStore::with_service_name("prism-kitsu-test")
            .tracking(["kitsu.password", "kitsu.access_token"]);
        let known = store.known_keys.lock().unwrap();
        assert!(known.contains("kitsu.password"));
        assert_eq!(known.len(), 2);
    }

    #[tokio::test]
    async fn test_set_and_get_secret() {
        // Headless CI machines usually have no keyring; skip quietly there.
        let store = KeyringSecureStore::with_service_name("prism-kitsu-test");
        let key = "test-key-unique-7f3a";
        let _ = store.delete_secret(key).await;

        if let Err(e) = store.set_secret(key, b"hunter2").await {
            println!("Keyring not available ({}), skipping test", e);
            return;
        }
        if let Ok(Some(value)) = store.get_secret(key).await {
            assert_eq!(value, b"hunter2".to_vec());
        }
        let _ = store.delete_secret(key).await;
    }
}
