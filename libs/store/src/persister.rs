//! The persister trait and path utilities.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::StoreError;

/// Hierarchical key-value storage for scheduler bookkeeping.
///
/// Paths are `/`-separated; intermediate nodes are implicit and carry no
/// data of their own. Implementations serialize all mutating calls behind
/// their own write lock.
pub trait Persister: Send + Sync {
    /// Fetches the bytes stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored at `path`.
    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Lists the direct child names under `path`. An unknown path yields
    /// an empty list.
    fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Stores `bytes` at `path`, overwriting any previous value.
    fn set(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Stores every entry atomically: either all writes land or none do.
    fn set_many(&self, entries: BTreeMap<String, Vec<u8>>) -> Result<(), StoreError>;

    /// Recursively deletes `path` and everything beneath it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing was stored at or
    /// beneath `path`.
    fn delete_all(&self, path: &str) -> Result<(), StoreError>;

    /// Releases any underlying storage handles.
    fn close(&self) {}
}

/// Strips leading and trailing separators so lookups are insensitive to
/// how callers spell the path.
pub(crate) fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// Computes the direct child names of `path` from a flat set of stored keys.
pub(crate) fn children_of<'a>(
    keys: impl Iterator<Item = &'a str>,
    path: &str,
) -> Vec<String> {
    let path = normalize(path);
    let mut children = BTreeSet::new();
    for key in keys {
        let remainder = if path.is_empty() {
            key
        } else {
            match key.strip_prefix(path).and_then(|r| r.strip_prefix('/')) {
                Some(r) => r,
                None => continue,
            }
        };
        if remainder.is_empty() {
            continue;
        }
        let segment = remainder.split('/').next().unwrap_or(remainder);
        children.insert(segment.to_string());
    }
    children.into_iter().collect()
}

/// Whether `key` is `path` itself or lives beneath it.
pub(crate) fn is_under(key: &str, path: &str) -> bool {
    let path = normalize(path);
    path.is_empty() || key == path || key.starts_with(&format!("{path}/"))
}

/// Walks the whole tree under the persister's root and returns every
/// stored leaf. Intermediate nodes without data are skipped.
pub fn dump_all(persister: &dyn Persister) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
    let mut out = BTreeMap::new();
    walk(persister, "", &mut out)?;
    Ok(out)
}

fn walk(
    persister: &dyn Persister,
    path: &str,
    out: &mut BTreeMap<String, Vec<u8>>,
) -> Result<(), StoreError> {
    if !path.is_empty() {
        match persister.get(path) {
            Ok(bytes) => {
                out.insert(path.to_string(), bytes);
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    for child in persister.get_children(path)? {
        let child_path = if path.is_empty() {
            child
        } else {
            format!("{path}/{child}")
        };
        walk(persister, &child_path, out)?;
    }
    Ok(())
}
