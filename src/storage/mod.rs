//! Storage backends for the textbook graph
//!
//! The importer talks to the `GraphStore` trait only. The primary
//! implementation is `SqliteStore` for persistent storage.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    DeleteReport, GraphStore, OpenStore, StorageError, StorageResult, StoreWriter, Upsert,
};
