//! Node representation in the textbook graph

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Stable identifier for a node
///
/// Hierarchy ids are paths built from the node's position in the source tree
/// (`biology/chapter-2/document-1`); Concept ids are `concept:{canonical_id}`.
/// Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a NodeId from an existing string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of the `order`-th child of this node with the given kind
    pub fn child(&self, kind: NodeKind, order: u32) -> Self {
        Self(format!("{}/{}-{}", self.0, kind.slug(), order))
    }

    /// Id of the Concept node for a canonical knowledge-base identifier
    pub fn concept(canonical_id: &str) -> Self {
        Self(format!("concept:{}", canonical_id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of a node: the eight hierarchy levels plus Concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Book,
    Chapter,
    Subchapter,
    Document,
    Section,
    Subsection,
    Paragraph,
    Sentence,
    Concept,
}

impl NodeKind {
    pub const ALL: [NodeKind; 9] = [
        NodeKind::Book,
        NodeKind::Chapter,
        NodeKind::Subchapter,
        NodeKind::Document,
        NodeKind::Section,
        NodeKind::Subsection,
        NodeKind::Paragraph,
        NodeKind::Sentence,
        NodeKind::Concept,
    ];

    /// Name as stored in the graph (`"Chapter"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Book => "Book",
            NodeKind::Chapter => "Chapter",
            NodeKind::Subchapter => "Subchapter",
            NodeKind::Document => "Document",
            NodeKind::Section => "Section",
            NodeKind::Subsection => "Subsection",
            NodeKind::Paragraph => "Paragraph",
            NodeKind::Sentence => "Sentence",
            NodeKind::Concept => "Concept",
        }
    }

    /// Lowercase form used in path ids (`"chapter"`)
    pub fn slug(&self) -> &'static str {
        match self {
            NodeKind::Book => "book",
            NodeKind::Chapter => "chapter",
            NodeKind::Subchapter => "subchapter",
            NodeKind::Document => "document",
            NodeKind::Section => "section",
            NodeKind::Subsection => "subsection",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Sentence => "sentence",
            NodeKind::Concept => "concept",
        }
    }

    /// Whether this kind is part of a textbook's own hierarchy
    pub fn is_hierarchy(&self) -> bool {
        !matches!(self, NodeKind::Concept)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown node kind: {}", s))
    }
}

/// Typed property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<PropertyValue>),
}

/// Properties collection, ordered so serialized rows are stable across runs
pub type Properties = BTreeMap<String, PropertyValue>;

/// A node in the textbook graph
///
/// Hierarchy nodes (Book down to Sentence) and Concept nodes share this
/// shape. Containers carry a `title`, Paragraphs and Sentences carry `text`,
/// Concepts carry the knowledge-base label as `title` and its description
/// as `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier
    pub id: NodeId,
    /// Hierarchy level or Concept
    pub kind: NodeKind,
    pub title: String,
    pub text: String,
    /// 1-based position among the parent's children (0 for roots and Concepts)
    pub order: u32,
    /// Origin of the node (`modules/m1/index.cnxml:12:5`, `wikidata:Q9647`)
    pub source_ref: String,
    /// Extra attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl Node {
    /// Create a node with empty attributes
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            title: String::new(),
            text: String::new(),
            order: 0,
            source_ref: String::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Set the source location
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_ref = source.into();
        self
    }

    /// Add a property to the node
    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}
