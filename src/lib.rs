//! Folio: textbook ingestion into a sentence-level knowledge graph
//!
//! Textbook markup is parsed into a strict containment hierarchy
//! (Book → Chapter → … → Paragraph → Sentence), candidate concepts are
//! extracted per Sentence and resolved against an external knowledge base
//! through a persistent cache, and the result is bulk-imported into a
//! graph store one level at a time.
//!
//! # Core Concepts
//!
//! - **Hierarchy**: every non-root node has exactly one parent, linked by a
//!   containment edge and its matching back-edge
//! - **Concepts**: shared across Books, keyed by the knowledge base's
//!   canonical identifier
//! - **Idempotence**: ids are derived from position, so re-importing a Book
//!   creates nothing new
//!
//! # Example
//!
//! ```
//! use folio::{GraphStore, OpenStore, SqliteStore};
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! store.setup_schema().unwrap();
//! assert!(store.schema_ready().unwrap());
//! ```

pub mod assemble;
pub mod concept;
pub mod config;
pub mod graph;
pub mod import;
pub mod parse;
pub mod pipeline;
pub mod resolve;
pub mod storage;

pub use assemble::{AssembledGraph, AssemblyError, AssemblyStats, GraphAssembler};
pub use concept::{ConceptExtractor, ConceptMention, GlossaryExtractor, RuleExtractor};
pub use config::{ConfigError, IngestConfig};
pub use graph::{Edge, EdgeDirection, Node, NodeId, NodeKind, PropertyValue};
pub use import::{BulkImporter, CancellationToken, ImportError, ImportMode, ImportReport, StoreWriteError};
pub use parse::{BookTree, MalformedSourceError, Segmenter, SourceError, TextbookParser};
pub use pipeline::{IngestPipeline, IngestReport, IngestRequest, PipelineError};
pub use resolve::{
    ConceptCache, ConceptResolver, KnowledgeBase, MockKnowledgeBase, ResolutionUnavailableError,
    WikidataClient,
};
pub use storage::{GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
