//! # berth-store
//!
//! Path-keyed persistent storage for scheduler bookkeeping.
//!
//! This crate provides durable storage behind a small hierarchical
//! key-value interface:
//! - [`Persister`]: the storage trait (`get`, `get_children`, `set`,
//!   `set_many`, `delete_all`, `close`)
//! - [`MemPersister`]: in-memory backend for tests and ephemeral runs
//! - [`SqlitePersister`]: SQLite-backed durable store (WAL mode)
//! - [`CachedPersister`]: transparent write-through cache over any backend
//!
//! Paths are `/`-separated; intermediate nodes are implicit. Every mutating
//! call is serialized by the backend's own write lock, and `set_many` is
//! atomic across paths.

mod cache;
mod error;
mod mem;
mod persister;
mod sqlite;

pub use cache::CachedPersister;
pub use error::StoreError;
pub use mem::MemPersister;
pub use persister::{dump_all, Persister};
pub use sqlite::SqlitePersister;
