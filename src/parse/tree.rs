//! In-memory hierarchy produced by the parser

use crate::graph::schema::{self, SchemaViolation};
use crate::graph::{Edge, Node, NodeId, NodeKind};
use std::path::PathBuf;

/// A hierarchy node with its ordered children
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub node: Node,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Order and id the next child of the given kind would receive
    pub(crate) fn next_child_slot(&self, kind: NodeKind) -> (u32, NodeId) {
        let order = self.children.len() as u32 + 1;
        (order, self.node.id.child(kind, order))
    }
}

/// One node visited by [`BookTree::walk`]
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub node: &'a Node,
    pub parent: Option<&'a Node>,
    /// 0 for the Book root
    pub depth: usize,
}

/// The parsed hierarchy of one collection, rooted at its Book node
#[derive(Debug, Clone, PartialEq)]
pub struct BookTree {
    pub root: TreeNode,
    /// Collection file the tree was parsed from
    pub source: PathBuf,
}

impl BookTree {
    pub fn book_id(&self) -> &NodeId {
        &self.root.node.id
    }

    pub fn title(&self) -> &str {
        &self.root.node.title
    }

    /// Pre-order traversal in document order: every node after its parent.
    pub fn walk(&self) -> Vec<Visit<'_>> {
        let mut out = Vec::new();
        let mut stack: Vec<(&TreeNode, Option<&Node>, usize)> = vec![(&self.root, None, 0)];
        while let Some((tree, parent, depth)) = stack.pop() {
            out.push(Visit {
                node: &tree.node,
                parent,
                depth,
            });
            for child in tree.children.iter().rev() {
                stack.push((child, Some(&tree.node), depth + 1));
            }
        }
        out
    }

    /// All nodes of one kind, in document order
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&Node> {
        self.walk()
            .into_iter()
            .filter(|v| v.node.kind == kind)
            .map(|v| v.node)
            .collect()
    }

    pub fn sentences(&self) -> Vec<&Node> {
        self.nodes_of_kind(NodeKind::Sentence)
    }

    pub fn node_count(&self) -> usize {
        self.walk().len()
    }

    /// Every (parent, child) relationship in the tree
    pub fn containment_pairs(&self) -> Vec<(&Node, &Node)> {
        self.walk()
            .into_iter()
            .filter_map(|v| v.parent.map(|p| (p, v.node)))
            .collect()
    }

    /// The containment and back-reference edges implied by the tree
    pub fn edges(&self) -> Result<Vec<Edge>, SchemaViolation> {
        let mut edges = Vec::new();
        for (parent, child) in self.containment_pairs() {
            edges.extend(schema::edge_pair(parent, child)?);
        }
        Ok(edges)
    }
}
