//! Edge representation: typed, directed containment and back-reference edges

use super::node::NodeId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which half of a parent/child pair an edge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeDirection {
    /// Parent → child (`BOOK_CONTAINS_CHAPTER`)
    Contains,
    /// Child → parent (`CHAPTER_BELONGS_TO_BOOK`)
    BelongsTo,
}

impl EdgeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeDirection::Contains => "contains",
            EdgeDirection::BelongsTo => "belongs_to",
        }
    }
}

impl FromStr for EdgeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(EdgeDirection::Contains),
            "belongs_to" => Ok(EdgeDirection::BelongsTo),
            other => Err(format!("unknown edge direction: {}", other)),
        }
    }
}

/// A directed, labelled edge
///
/// Edge identity is `(source, label, target)`: the store never holds two
/// edges with the same triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    /// Relationship label from the hierarchy schema
    pub label: String,
    pub direction: EdgeDirection,
}

impl Edge {
    pub fn new(
        source: NodeId,
        target: NodeId,
        label: impl Into<String>,
        direction: EdgeDirection,
    ) -> Self {
        Self {
            source,
            target,
            label: label.into(),
            direction,
        }
    }

    /// Human-readable identity used in logs and error messages
    pub fn key(&self) -> String {
        format!("{}-[{}]->{}", self.source, self.label, self.target)
    }
}
