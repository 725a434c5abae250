//! Storage trait definitions

use crate::graph::{Edge, Node, NodeId, NodeKind};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema not set up; run setup-schema first")]
    SchemaMissing,

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Connection lock poisoned")]
    LockPoisoned,

    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Whether an upsert created the node or overwrote an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// What `delete_book` removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub nodes: usize,
    pub edges: usize,
}

/// Write access inside one transaction
pub trait StoreWriter {
    /// Create the node, or overwrite every attribute of the existing one
    fn upsert_node(&mut self, node: &Node) -> StorageResult<Upsert>;

    /// Create the edge unless `(source, label, target)` exists; true when created
    fn create_edge_if_absent(&mut self, edge: &Edge) -> StorageResult<bool>;
}

/// Trait for graph storage backends
///
/// Implementations must be thread-safe (Send + Sync); the importer writes
/// from a blocking thread while readers may run elsewhere.
pub trait GraphStore: Send + Sync {
    // === Schema ===

    /// Create tables and indexes; idempotent
    fn setup_schema(&self) -> StorageResult<()>;

    fn schema_ready(&self) -> StorageResult<bool>;

    // === Writes ===

    /// Run `work` in one transaction: commit on `Ok`, roll back on `Err`.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreWriter) -> StorageResult<()>,
    ) -> StorageResult<()>;

    /// Delete everything reachable by containment from a Book, keeping Concepts
    fn delete_book(&self, book_id: &NodeId) -> StorageResult<DeleteReport>;

    /// Delete Concept nodes no Sentence contains any more; returns how many
    fn prune_orphan_concepts(&self) -> StorageResult<usize>;

    // === Inspection ===

    fn load_node(&self, id: &NodeId) -> StorageResult<Option<Node>>;

    /// Get edges originating from a node
    fn edges_from(&self, id: &NodeId) -> StorageResult<Vec<Edge>>;

    /// Get edges targeting a node
    fn edges_to(&self, id: &NodeId) -> StorageResult<Vec<Edge>>;

    /// Ids reachable by containment from a Book (the Book included), Concepts excluded
    fn book_subtree(&self, book_id: &NodeId) -> StorageResult<Vec<NodeId>>;

    /// Ids carrying the Book's id prefix (the Book included), Concepts excluded,
    /// whether or not an edge reaches them
    fn book_nodes(&self, book_id: &NodeId) -> StorageResult<Vec<NodeId>>;

    fn list_books(&self) -> StorageResult<Vec<Node>>;

    fn node_counts(&self) -> StorageResult<BTreeMap<NodeKind, usize>>;

    fn edge_counts(&self) -> StorageResult<BTreeMap<String, usize>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
