//! # Relmap Storage
//!
//! In-memory table store and entity mappers for relmap.
//!
//! The store keeps one table of [`Row`](relmap_core::Row)s per entity kind.
//! It doubles as the database [`Connection`](relmap_core::Connection), so
//! transactions begun by the database cover every mapper sharing the store.
//!
//! ## Design Principles
//!
//! - Tables know rows and identities, never entity types
//! - Each write call applies to all given rows or to none
//! - Rollback restores the state captured when the transaction began
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Example
//!
//! ```rust
//! use relmap_core::Database;
//! use relmap_storage::MemoryStore;
//!
//! let store = MemoryStore::shared();
//! let db = Database::builder(store.clone()).build().unwrap();
//! assert!(db.entity_kinds().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod mapper;
mod snapshot;
mod store;

pub use error::{StorageError, StorageResult};
pub use mapper::MemoryMapper;
pub use snapshot::SNAPSHOT_VERSION;
pub use store::MemoryStore;
