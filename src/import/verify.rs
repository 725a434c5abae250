//! Hierarchy completeness check against the store

use crate::graph::schema::relation;
use crate::graph::{EdgeDirection, NodeId};
use crate::storage::{GraphStore, StorageResult};
use std::fmt;

/// A containment problem found in a stored Book
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyDefect {
    /// No parent ContainmentEdge
    Orphan(NodeId),
    /// More than one parent ContainmentEdge
    MultipleParents(NodeId, usize),
    /// ContainmentEdge without its BelongsToEdge
    MissingBackEdge { parent: NodeId, child: NodeId },
}

impl fmt::Display for HierarchyDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HierarchyDefect::Orphan(id) => write!(f, "{} has no parent", id),
            HierarchyDefect::MultipleParents(id, n) => write!(f, "{} has {} parents", id, n),
            HierarchyDefect::MissingBackEdge { parent, child } => {
                write!(f, "{} → {} has no back-edge", parent, child)
            }
        }
    }
}

/// Check every non-root node of a Book for exactly one parent edge pair.
///
/// Nodes are found by id prefix rather than by following edges, so a node
/// whose parent edge is gone still shows up as an orphan.
pub fn verify_book(store: &dyn GraphStore, book_id: &NodeId) -> StorageResult<Vec<HierarchyDefect>> {
    let mut defects = Vec::new();
    for id in store.book_nodes(book_id)? {
        if &id == book_id {
            continue;
        }
        let parents: Vec<_> = store
            .edges_to(&id)?
            .into_iter()
            .filter(|e| e.direction == EdgeDirection::Contains)
            .collect();
        match parents.len() {
            0 => defects.push(HierarchyDefect::Orphan(id.clone())),
            1 => {}
            n => defects.push(HierarchyDefect::MultipleParents(id.clone(), n)),
        }

        let backs = store.edges_from(&id)?;
        for forward in &parents {
            let (Some(parent), Some(child)) = (store.load_node(&forward.source)?, store.load_node(&id)?) else {
                continue;
            };
            let expected = relation(parent.kind, child.kind).map(|r| r.belongs);
            let present = backs.iter().any(|b| {
                b.direction == EdgeDirection::BelongsTo
                    && b.target == forward.source
                    && Some(b.label.as_str()) == expected
            });
            if !present {
                defects.push(HierarchyDefect::MissingBackEdge {
                    parent: forward.source.clone(),
                    child: id.clone(),
                });
            }
        }
    }
    Ok(defects)
}
