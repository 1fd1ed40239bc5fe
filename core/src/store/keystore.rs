// Secure key store: where derived channel keys are handed off
//
// Hosts normally plug in a platform keychain. `BackendKeyStore` keeps keys
// in a `StorageBackend` under a `keys/` prefix.

use super::{StorageBackend, StoreError};
use std::sync::Arc;
use tracing::debug;

const KEY_PREFIX: &str = "keys/";

/// Destination for derived secret keys
pub trait SecureKeyStore: Send + Sync {
    fn store_key(&self, key: &[u8], name: &str) -> Result<(), StoreError>;
    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn delete_key(&self, name: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct BackendKeyStore {
    backend: Arc<dyn StorageBackend>,
}

impl BackendKeyStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    fn storage_key(name: &str) -> Vec<u8> {
        format!("{}{}", KEY_PREFIX, name).into_bytes()
    }
}

impl SecureKeyStore for BackendKeyStore {
    fn store_key(&self, key: &[u8], name: &str) -> Result<(), StoreError> {
        self.backend.put(&Self::storage_key(name), key)?;
        debug!("Stored key {}", name);
        Ok(())
    }

    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.backend.get(&Self::storage_key(name))
    }

    fn delete_key(&self, name: &str) -> Result<(), StoreError> {
        self.backend.remove(&Self::storage_key(name))?;
        debug!("Deleted key {}", name);
        Ok(())
    }
}
