//! The hierarchy schema: valid (parent, child) kind pairs and their edge labels
//!
//! Both edge directions come from the one table below, so adding a level
//! means adding one row.

use super::edge::{Edge, EdgeDirection};
use super::node::{Node, NodeKind};
use thiserror::Error;

/// One valid containment pair with its forward and backward labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub parent: NodeKind,
    pub child: NodeKind,
    pub contains: &'static str,
    pub belongs: &'static str,
}

pub const HIERARCHY_SCHEMA: &[Relation] = &[
    Relation {
        parent: NodeKind::Book,
        child: NodeKind::Chapter,
        contains: "BOOK_CONTAINS_CHAPTER",
        belongs: "CHAPTER_BELONGS_TO_BOOK",
    },
    Relation {
        parent: NodeKind::Chapter,
        child: NodeKind::Subchapter,
        contains: "CHAPTER_CONTAINS_SUBCHAPTER",
        belongs: "SUBCHAPTER_BELONGS_TO_CHAPTER",
    },
    Relation {
        parent: NodeKind::Chapter,
        child: NodeKind::Document,
        contains: "CHAPTER_CONTAINS_DOCUMENT",
        belongs: "DOCUMENT_BELONGS_TO_CHAPTER",
    },
    Relation {
        parent: NodeKind::Subchapter,
        child: NodeKind::Document,
        contains: "SUBCHAPTER_CONTAINS_DOCUMENT",
        belongs: "DOCUMENT_BELONGS_TO_SUBCHAPTER",
    },
    Relation {
        parent: NodeKind::Document,
        child: NodeKind::Section,
        contains: "DOCUMENT_CONTAINS_SECTION",
        belongs: "SECTION_BELONGS_TO_DOCUMENT",
    },
    Relation {
        parent: NodeKind::Document,
        child: NodeKind::Paragraph,
        contains: "DOCUMENT_CONTAINS_PARAGRAPH",
        belongs: "PARAGRAPH_BELONGS_TO_DOCUMENT",
    },
    Relation {
        parent: NodeKind::Section,
        child: NodeKind::Subsection,
        contains: "SECTION_CONTAINS_SUBSECTION",
        belongs: "SUBSECTION_BELONGS_TO_SECTION",
    },
    Relation {
        parent: NodeKind::Section,
        child: NodeKind::Paragraph,
        contains: "SECTION_CONTAINS_PARAGRAPH",
        belongs: "PARAGRAPH_BELONGS_TO_SECTION",
    },
    Relation {
        parent: NodeKind::Subsection,
        child: NodeKind::Paragraph,
        contains: "SUBSECTION_CONTAINS_PARAGRAPH",
        belongs: "PARAGRAPH_BELONGS_TO_SUBSECTION",
    },
    Relation {
        parent: NodeKind::Paragraph,
        child: NodeKind::Sentence,
        contains: "PARAGRAPH_CONTAINS_SENTENCE",
        belongs: "SENTENCE_BELONGS_TO_PARAGRAPH",
    },
    Relation {
        parent: NodeKind::Sentence,
        child: NodeKind::Concept,
        contains: "SENTENCE_CONTAINS_CONCEPT",
        belongs: "CONCEPT_BELONGS_IN_SENTENCE",
    },
];

/// A parent/child pair that the schema does not allow
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{parent} cannot contain {child}")]
pub struct SchemaViolation {
    pub parent: NodeKind,
    pub child: NodeKind,
}

/// Look up the relation for a (parent, child) kind pair
pub fn relation(parent: NodeKind, child: NodeKind) -> Option<&'static Relation> {
    HIERARCHY_SCHEMA
        .iter()
        .find(|r| r.parent == parent && r.child == child)
}

pub fn allows(parent: NodeKind, child: NodeKind) -> bool {
    relation(parent, child).is_some()
}

/// Build the forward and backward edges for one parent/child relationship
pub fn edge_pair(parent: &Node, child: &Node) -> Result<[Edge; 2], SchemaViolation> {
    let rel = relation(parent.kind, child.kind).ok_or(SchemaViolation {
        parent: parent.kind,
        child: child.kind,
    })?;
    Ok([
        Edge::new(
            parent.id.clone(),
            child.id.clone(),
            rel.contains,
            EdgeDirection::Contains,
        ),
        Edge::new(
            child.id.clone(),
            parent.id.clone(),
            rel.belongs,
            EdgeDirection::BelongsTo,
        ),
    ])
}

/// Every label the schema can produce, forward labels first
pub fn all_labels() -> impl Iterator<Item = &'static str> {
    HIERARCHY_SCHEMA
        .iter()
        .map(|r| r.contains)
        .chain(HIERARCHY_SCHEMA.iter().map(|r| r.belongs))
}
