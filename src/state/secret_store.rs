use super::credential_store::{normalize_value, CredentialStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const KEYRING_SERVICE: &str = "org.donation-client.session";

/// Session keys in the OS keychain / secret service, one entry per key,
/// fronted by an in-memory copy so each key hits the keychain at most once
/// per process.
#[derive(Clone)]
pub struct KeyringCredentialStore {
    service: String,
    in_memory: Arc<Mutex<HashMap<String, String>>>,
}

fn map_keyring_error(err: keyring::Error) -> StoreError {
    match err {
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            StoreError::Unavailable
        }
        other => StoreError::Keyring(other.to_string()),
    }
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            in_memory: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(&self.service, key).map_err(map_keyring_error)
    }

    /// Runs a keychain call for `key` on the blocking pool.
    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<keyring::Result<T>, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> keyring::Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || keyring::Entry::new(&service, &key).and_then(op))
            .await
            .map_err(|e| StoreError::Keyring(format!("keychain task failed: {e}")))
    }

    pub fn is_available(&self) -> bool {
        let Ok(entry) = self.entry(super::KEY_ACCESS_TOKEN) else {
            return false;
        };

        match entry.get_password() {
            Ok(_) => true,
            Err(keyring::Error::NoEntry) => true,
            Err(keyring::Error::BadEncoding(_)) => true,
            Err(keyring::Error::Ambiguous(_)) => true,
            Err(_) => false,
        }
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.in_memory.lock().await.get(key).cloned() {
            return Ok(Some(value));
        }

        match self.with_entry(key, |entry| entry.get_password()).await? {
            Ok(pwd) => {
                let Some(value) = normalize_value(&pwd) else {
                    return Ok(None);
                };
                self.in_memory
                    .lock()
                    .await
                    .insert(key.to_string(), value.clone());
                Ok(Some(value))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let Some(value) = normalize_value(value) else {
            return self.remove(key).await;
        };
        let secret = value.clone();
        self.with_entry(key, move |entry| entry.set_password(&secret))
            .await?
            .map_err(map_keyring_error)?;
        self.in_memory.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.in_memory.lock().await.remove(key);
        match self.with_entry(key, |entry| entry.delete_credential()).await? {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}
