//! Transparent write-through cache over a persister.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::error;

use crate::error::StoreError;
use crate::persister::{children_of, dump_all, is_under, normalize, Persister};

/// A write-through cache for an underlying [`Persister`].
///
/// Each instance is thread-safe, but there is no guarantee of consistent
/// behavior across multiple cache instances over the same backend. Reads
/// hit the in-memory mirror under the read lock; every mutation writes the
/// backing store first, then the mirror, under the write lock.
pub struct CachedPersister<P: Persister> {
    persister: P,
    cache: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl<P: Persister> CachedPersister<P> {
    /// Wraps a persister, loading a full snapshot of its data.
    pub fn new(persister: P) -> Result<Self, StoreError> {
        let snapshot = dump_all(&persister)?;
        Ok(Self {
            persister,
            cache: RwLock::new(snapshot),
        })
    }

    /// Re-reads the full backing-store state into the mirror.
    pub fn refresh(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.write().expect("cache lock poisoned");
        *cache = dump_all(&self.persister)?;
        Ok(())
    }
}

impl<P: Persister> Persister for CachedPersister<P> {
    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let path = normalize(path);
        let cache = self.cache.read().expect("cache lock poisoned");
        cache
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let cache = self.cache.read().expect("cache lock poisoned");
        Ok(children_of(cache.keys().map(String::as_str), path))
    }

    fn set(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut cache = self.cache.write().expect("cache lock poisoned");
        self.persister.set(path, bytes)?;
        cache.insert(normalize(path).to_string(), bytes.to_vec());
        Ok(())
    }

    fn set_many(&self, entries: BTreeMap<String, Vec<u8>>) -> Result<(), StoreError> {
        let mut cache = self.cache.write().expect("cache lock poisoned");
        self.persister.set_many(entries.clone())?;
        for (path, bytes) in entries {
            cache.insert(normalize(&path).to_string(), bytes);
        }
        Ok(())
    }

    fn delete_all(&self, path: &str) -> Result<(), StoreError> {
        let mut cache = self.cache.write().expect("cache lock poisoned");
        self.persister.delete_all(path)?;
        let before = cache.len();
        cache.retain(|key, _| !is_under(key, path));
        if cache.len() == before {
            // The backing store had the value but the mirror did not. We
            // replicate the backend's outcome rather than failing the call.
            error!(path = %normalize(path), "Cache had no entries to delete under path present in backing store");
        }
        Ok(())
    }

    fn close(&self) {
        self.persister.close();
    }
}
