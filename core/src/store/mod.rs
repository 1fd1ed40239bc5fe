// Store module: persistence collaborators for keys and favorites

pub mod backend;
pub mod favorites;
pub mod keystore;

pub use backend::{MemoryStorage, SledStorage, StorageBackend};
pub use favorites::{BackendFavorites, FavoritesStore};
pub use keystore::{BackendKeyStore, SecureKeyStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Raised by host-provided stores (platform keychains and the like)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
