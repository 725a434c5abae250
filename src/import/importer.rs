//! Level-by-level commit of an assembled graph

use super::cancel::CancellationToken;
use crate::assemble::AssembledGraph;
use crate::graph::NodeId;
use crate::storage::{DeleteReport, GraphStore, StorageError, Upsert};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How an import treats data already in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Upsert nodes, add missing edges
    #[default]
    Incremental,
    /// Delete the Book's subtree first, then import
    Cleanup,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportMode::Incremental => "incremental",
            ImportMode::Cleanup => "cleanup",
        })
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(ImportMode::Incremental),
            "cleanup" => Ok(ImportMode::Cleanup),
            other => Err(format!("unknown import mode '{}' (expected incremental or cleanup)", other)),
        }
    }
}

/// Counts of what an import wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub edges_created: usize,
    /// Edges that were already present
    pub edges_existing: usize,
    pub levels_completed: usize,
    pub transactions: usize,
    pub deleted_nodes: usize,
    pub deleted_edges: usize,
}

impl ImportReport {
    fn absorb(&mut self, chunk: &ImportReport) {
        self.nodes_created += chunk.nodes_created;
        self.nodes_updated += chunk.nodes_updated;
        self.edges_created += chunk.edges_created;
        self.edges_existing += chunk.edges_existing;
        self.transactions += 1;
    }

    /// True when the import changed nothing structural
    pub fn created_nothing(&self) -> bool {
        self.nodes_created == 0 && self.edges_created == 0
    }
}

/// The store failed while committing a level. Earlier levels are committed;
/// re-running the import is safe.
#[derive(Debug, Error)]
#[error("store write failed for {book_id} at level {level} ({levels_completed} levels committed): {source}")]
pub struct StoreWriteError {
    pub book_id: NodeId,
    pub level: usize,
    pub levels_completed: usize,
    pub partial: ImportReport,
    #[source]
    pub source: StorageError,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Store(#[from] StoreWriteError),

    #[error("import of {book_id} cancelled after {} levels", .partial.levels_completed)]
    Cancelled { book_id: NodeId, partial: ImportReport },

    #[error("cleanup of {book_id} failed: {source}")]
    Cleanup {
        book_id: NodeId,
        #[source]
        source: StorageError,
    },
}

/// Commits [`AssembledGraph`]s into a [`GraphStore`].
///
/// Each level is split into chunks of `batch_size` entries; a chunk is one
/// transaction holding its nodes and their edges to already-committed
/// parents.
pub struct BulkImporter {
    store: Arc<dyn GraphStore>,
    batch_size: usize,
    cancel: CancellationToken,
}

impl BulkImporter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            batch_size: 500,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Delete a Book's subtree; Concept nodes survive.
    pub fn cleanup(&self, book_id: &NodeId) -> Result<DeleteReport, ImportError> {
        let deleted = self
            .store
            .delete_book(book_id)
            .map_err(|source| ImportError::Cleanup {
                book_id: book_id.clone(),
                source,
            })?;
        info!(
            "cleanup of {}: removed {} nodes, {} edges",
            book_id, deleted.nodes, deleted.edges
        );
        Ok(deleted)
    }

    pub fn import(&self, graph: &AssembledGraph, mode: ImportMode) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::default();
        if mode == ImportMode::Cleanup {
            let deleted = self.cleanup(&graph.book_id)?;
            report.deleted_nodes = deleted.nodes;
            report.deleted_edges = deleted.edges;
        }

        for (index, level) in graph.levels.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("import of {} cancelled before level {}", graph.book_id, index);
                return Err(ImportError::Cancelled {
                    book_id: graph.book_id.clone(),
                    partial: report,
                });
            }

            for chunk in level.entries.chunks(self.batch_size) {
                let mut written = ImportReport::default();
                let result = self.store.transaction(&mut |w| {
                    written = ImportReport::default();
                    for entry in chunk {
                        match w.upsert_node(&entry.node)? {
                            Upsert::Created => written.nodes_created += 1,
                            Upsert::Updated => written.nodes_updated += 1,
                        }
                        for edge in &entry.edges {
                            if w.create_edge_if_absent(edge)? {
                                written.edges_created += 1;
                            } else {
                                written.edges_existing += 1;
                            }
                        }
                    }
                    Ok(())
                });
                if let Err(source) = result {
                    return Err(StoreWriteError {
                        book_id: graph.book_id.clone(),
                        level: index,
                        levels_completed: report.levels_completed,
                        partial: report,
                        source,
                    }
                    .into());
                }
                report.absorb(&written);
            }

            report.levels_completed += 1;
            debug!(
                "{}: level {} committed ({} entries)",
                graph.book_id,
                index,
                level.entries.len()
            );
        }

        info!(
            "imported {}: {} nodes created, {} updated, {} edges created",
            graph.book_id, report.nodes_created, report.nodes_updated, report.edges_created
        );
        Ok(report)
    }
}
