mod credential_store;
mod file_store;
mod memory_store;
mod secret_store;

pub use credential_store::{
    CredentialStore, StoreError, KEY_ACCESS_TOKEN, KEY_LEGACY_PROFILE, KEY_REFRESH_TOKEN,
    KEY_USER,
};
pub use file_store::FileCredentialStore;
pub use memory_store::MemoryCredentialStore;
pub use secret_store::KeyringCredentialStore;

use crate::settings::{ClientConfig, StoreKind};
use std::sync::Arc;

/// Opens the session store selected by the configuration.
pub fn open_store(config: &ClientConfig) -> Result<Arc<dyn CredentialStore>, StoreError> {
    let store: Arc<dyn CredentialStore> = match config.store {
        StoreKind::File => Arc::new(FileCredentialStore::new(config.resolved_store_path())),
        StoreKind::Memory => Arc::new(MemoryCredentialStore::new()),
        StoreKind::Keyring => {
            let store = KeyringCredentialStore::new();
            if !store.is_available() {
                return Err(StoreError::Unavailable);
            }
            Arc::new(store)
        }
    };
    Ok(store)
}
