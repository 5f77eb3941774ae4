use async_trait::async_trait;
use thiserror::Error;

pub const KEY_ACCESS_TOKEN: &str = "auth:access";
pub const KEY_REFRESH_TOKEN: &str = "auth:refresh";
pub const KEY_USER: &str = "auth:user";
/// Display-only profile snapshot kept for older views.
pub const KEY_LEGACY_PROFILE: &str = "userData";

pub const SESSION_KEYS: [&str; 4] = [
    KEY_ACCESS_TOKEN,
    KEY_REFRESH_TOKEN,
    KEY_USER,
    KEY_LEGACY_PROFILE,
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store io error")]
    Io(#[from] std::io::Error),
    #[error("session store holds invalid json")]
    Json(#[from] serde_json::Error),
    #[error("os keychain error: {0}")]
    Keyring(String),
    #[error("OS keychain/secret service is unavailable.")]
    Unavailable,
}

/// Key-value storage for session credentials.
///
/// Values are trimmed on write; writing an empty value removes the key, so
/// `get` never yields an empty string.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Drops every session key: both tokens and both profile snapshots.
    async fn clear(&self) -> Result<(), StoreError> {
        for key in SESSION_KEYS {
            self.remove(key).await?;
        }
        Ok(())
    }
}

pub(crate) fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
