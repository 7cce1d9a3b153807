//! In-memory persister for tests and ephemeral runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::persister::{children_of, is_under, normalize, Persister};

/// Persister backed by an in-memory map. Durable for the lifetime of the
/// process only; readers do not block readers.
#[derive(Debug, Default)]
pub struct MemPersister {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemPersister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a persister with pre-existing entries.
    #[must_use]
    pub fn with_data(data: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Persister for MemPersister {
    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let path = normalize(path);
        let data = self.data.read().expect("store lock poisoned");
        data.get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().expect("store lock poisoned");
        Ok(children_of(data.keys().map(String::as_str), path))
    }

    fn set(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut data = self.data.write().expect("store lock poisoned");
        data.insert(normalize(path).to_string(), bytes.to_vec());
        Ok(())
    }

    fn set_many(&self, entries: BTreeMap<String, Vec<u8>>) -> Result<(), StoreError> {
        let mut data = self.data.write().expect("store lock poisoned");
        for (path, bytes) in entries {
            data.insert(normalize(&path).to_string(), bytes);
        }
        Ok(())
    }

    fn delete_all(&self, path: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().expect("store lock poisoned");
        let before = data.len();
        data.retain(|key, _| !is_under(key, path));
        if data.len() == before {
            return Err(StoreError::NotFound(normalize(path).to_string()));
        }
        Ok(())
    }
}
