// Favorites: persisted set of peer fingerprints
//
// The whole set is stored as one JSON array under `favorites`, and cached
// in memory so lookups never touch storage.

use super::{StorageBackend, StoreError};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

const FAVORITES_KEY: &[u8] = b"favorites";

/// Lookup side of the favorites set
pub trait FavoritesStore: Send + Sync {
    fn is_favorite(&self, fingerprint: &str) -> bool;
}

pub struct BackendFavorites {
    backend: Arc<dyn StorageBackend>,
    cache: RwLock<BTreeSet<String>>,
}

impl BackendFavorites {
    /// Load the persisted set, starting empty if nothing is stored yet
    pub fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        let cache = match backend.get(FAVORITES_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => BTreeSet::new(),
        };
        Ok(Self {
            backend,
            cache: RwLock::new(cache),
        })
    }

    /// Returns false if the fingerprint was already a favorite
    pub fn add_favorite(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let mut cache = self.cache.write();
        if !cache.insert(fingerprint.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.persist(&cache) {
            cache.remove(fingerprint);
            return Err(e);
        }
        debug!("Added favorite {}", fingerprint);
        Ok(true)
    }

    /// Returns false if the fingerprint was not a favorite
    pub fn remove_favorite(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let mut cache = self.cache.write();
        if !cache.remove(fingerprint) {
            return Ok(false);
        }
        if let Err(e) = self.persist(&cache) {
            cache.insert(fingerprint.to_string());
            return Err(e);
        }
        debug!("Removed favorite {}", fingerprint);
        Ok(true)
    }

    /// All favorites in sorted order
    pub fn list(&self) -> Vec<String> {
        self.cache.read().iter().cloned().collect()
    }

    fn persist(&self, set: &BTreeSet<String>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(set)?;
        self.backend.put(FAVORITES_KEY, &bytes)
    }
}

impl FavoritesStore for BackendFavorites {
    fn is_favorite(&self, fingerprint: &str) -> bool {
        self.cache.read().contains(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStorage, SledStorage};

    #[test]
    fn test_add_remove() {
        let favorites = BackendFavorites::open(Arc::new(MemoryStorage::new())).unwrap();
        assert!(!favorites.is_favorite("abc"));

        assert!(favorites.add_favorite("abc").unwrap());
        assert!(!favorites.add_favorite("abc").unwrap());
        assert!(favorites.is_favorite("abc"));

        assert!(favorites.remove_favorite("abc").unwrap());
        assert!(!favorites.remove_favorite("abc").unwrap());
        assert!(!favorites.is_favorite("abc"));
    }

    #[test]
    fn test_list_sorted() {
        let favorites = BackendFavorites::open(Arc::new(MemoryStorage::new())).unwrap();
        favorites.add_favorite("zeta").unwrap();
        favorites.add_favorite("alpha").unwrap();
        assert_eq!(favorites.list(), vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_persisted_as_json() {
        let backend = MemoryStorage::new();
        let favorites = BackendFavorites::open(Arc::new(backend.clone())).unwrap();
        favorites.add_favorite("fp1").unwrap();

        let raw = backend.get(FAVORITES_KEY).unwrap().unwrap();
        let parsed: Vec<String> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed, vec!["fp1".to_string()]);
    }

    #[test]
    fn test_reload_from_sled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites");
        {
            let backend = Arc::new(SledStorage::open(&path).unwrap());
            let favorites = BackendFavorites::open(backend.clone()).unwrap();
            favorites.add_favorite("persisted").unwrap();
            backend.flush().unwrap();
        }
        let favorites = BackendFavorites::open(Arc::new(SledStorage::open(&path).unwrap())).unwrap();
        assert!(favorites.is_favorite("persisted"));
    }

    #[test]
    fn test_corrupt_data() {
        let backend = MemoryStorage::new();
        backend.put(FAVORITES_KEY, b"not json").unwrap();
        assert!(matches!(
            BackendFavorites::open(Arc::new(backend)),
            Err(StoreError::Serialization(_))
        ));
    }
}
