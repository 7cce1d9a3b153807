//! SQLite-backed persister.
//!
//! Durable storage for scheduler bookkeeping, enabling recovery after
//! process restarts. Paths map onto a single `kv` table; WAL mode keeps
//! readers from blocking behind the writer.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;
use crate::persister::{children_of, is_under, normalize, Persister};

/// SQLite persister. The connection is serialized behind a mutex; SQLite
/// itself provides the on-disk atomicity for `set_many`.
pub struct SqlitePersister {
    conn: Mutex<Connection>,
}

impl SqlitePersister {
    /// Opens or creates a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                path TEXT PRIMARY KEY,
                bytes BLOB NOT NULL
            );
            "#,
        )?;
        debug!("Persister schema initialized");
        Ok(())
    }
}

impl Persister for SqlitePersister {
    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let path = normalize(path);
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT bytes FROM kv WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        bytes.ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let mut stmt = conn.prepare("SELECT path FROM kv")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(children_of(keys.iter().map(String::as_str), path))
    }

    fn set(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = normalize(path);
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        conn.execute(
            "INSERT INTO kv (path, bytes) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET bytes = excluded.bytes",
            params![path, bytes],
        )?;
        Ok(())
    }

    fn set_many(&self, entries: BTreeMap<String, Vec<u8>>) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().expect("sqlite lock poisoned");
        let tx = conn.transaction()?;
        for (path, bytes) in &entries {
            tx.execute(
                "INSERT INTO kv (path, bytes) VALUES (?1, ?2)
                 ON CONFLICT(path) DO UPDATE SET bytes = excluded.bytes",
                params![normalize(path), bytes],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_all(&self, path: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let mut stmt = conn.prepare("SELECT path FROM kv")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let doomed: Vec<&String> = keys.iter().filter(|k| is_under(k, path)).collect();
        if doomed.is_empty() {
            return Err(StoreError::NotFound(normalize(path).to_string()));
        }
        for key in doomed {
            conn.execute("DELETE FROM kv WHERE path = ?1", params![key])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_persister_roundtrip() {
        let p = SqlitePersister::open_in_memory().unwrap();
        p.set("svc/FrameworkId", b"fw-1").unwrap();
        assert_eq!(p.get("svc/FrameworkId").unwrap(), b"fw-1");
        assert!(p.get("svc/missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_sqlite_persister_set_many_atomic() {
        let p = SqlitePersister::open_in_memory().unwrap();
        let mut entries = BTreeMap::new();
        entries.insert("svc/Tasks/a/info".to_string(), b"a".to_vec());
        entries.insert("svc/Tasks/b/info".to_string(), b"b".to_vec());
        p.set_many(entries).unwrap();

        assert_eq!(
            p.get_children("svc/Tasks").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_sqlite_persister_delete_all() {
        let p = SqlitePersister::open_in_memory().unwrap();
        p.set("svc/Tasks/a/info", b"a").unwrap();
        p.set("svc/FrameworkId", b"fw").unwrap();

        p.delete_all("svc").unwrap();
        assert!(p.get("svc/FrameworkId").unwrap_err().is_not_found());
        assert!(p.delete_all("svc").unwrap_err().is_not_found());
    }
}
