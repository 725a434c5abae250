//! Graph assembly: parsed hierarchy + resolved mentions → levelled node/edge set
//!
//! Levels follow tree depth (Book first, Sentences last among hierarchy
//! nodes) with one extra Concept level at the end. Each entry carries the
//! node plus the edges that link it to its parent(s), so committing an entry
//! never leaves a node without its containment edge.

use crate::concept::ConceptMention;
use crate::graph::schema::{edge_pair, SchemaViolation};
use crate::graph::{Edge, Node, NodeId, NodeKind, PropertyValue};
use crate::parse::BookTree;
use crate::resolve::{Resolution, ResolutionUnavailableError};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    #[error("mention refers to unknown sentence {0}")]
    UnknownSentence(NodeId),
}

/// A node with the edges linking it to its parent(s)
#[derive(Debug, Clone, PartialEq)]
pub struct LevelEntry {
    pub node: Node,
    pub edges: Vec<Edge>,
}

/// Entries that can be committed together once all earlier levels are in
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Tree depth (0 = Book); the Concept level uses one past the deepest
    pub depth: usize,
    pub entries: Vec<LevelEntry>,
}

impl Level {
    pub fn edge_count(&self) -> usize {
        self.entries.iter().map(|e| e.edges.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub hierarchy_nodes: usize,
    pub concepts: usize,
    /// Distinct (sentence, concept) links
    pub concept_links: usize,
    pub mentions: usize,
    /// Mentions the knowledge base has no match for
    pub unmatched_mentions: usize,
    /// Mentions skipped because resolution failed
    pub unavailable_mentions: usize,
}

/// The full node/edge set of one Book, ready for import
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledGraph {
    pub book_id: NodeId,
    pub levels: Vec<Level>,
    pub stats: AssemblyStats,
}

impl AssembledGraph {
    pub fn node_count(&self) -> usize {
        self.levels.iter().map(|l| l.entries.len()).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.levels.iter().map(Level::edge_count).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.levels.iter().flat_map(|l| l.entries.iter().map(|e| &e.node))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.levels.iter().flat_map(|l| l.entries.iter().flat_map(|e| e.edges.iter()))
    }
}

/// Resolution outcome per normalized mention key
pub type Resolutions = HashMap<String, Result<Resolution, ResolutionUnavailableError>>;

/// Builds [`AssembledGraph`]s from parsed books.
pub struct GraphAssembler {
    /// Prefix of Concept `source_ref`s (`wikidata`)
    knowledge_base: String,
}

impl GraphAssembler {
    pub fn new(knowledge_base: impl Into<String>) -> Self {
        Self {
            knowledge_base: knowledge_base.into(),
        }
    }

    pub fn assemble(
        &self,
        tree: &BookTree,
        mentions: &[ConceptMention],
        resolutions: &Resolutions,
    ) -> Result<AssembledGraph, AssemblyError> {
        let mut stats = AssemblyStats::default();
        let mut levels: Vec<Level> = Vec::new();
        let mut sentences: HashMap<&NodeId, &Node> = HashMap::new();

        for visit in tree.walk() {
            let edges = match visit.parent {
                Some(parent) => edge_pair(parent, visit.node)?.to_vec(),
                None => Vec::new(),
            };
            while levels.len() <= visit.depth {
                levels.push(Level {
                    depth: levels.len(),
                    entries: Vec::new(),
                });
            }
            levels[visit.depth].entries.push(LevelEntry {
                node: visit.node.clone(),
                edges,
            });
            if visit.node.kind == NodeKind::Sentence {
                sentences.insert(&visit.node.id, visit.node);
            }
            stats.hierarchy_nodes += 1;
        }

        // concepts in order of first mention; one link per (sentence, concept)
        let mut concept_index: HashMap<String, usize> = HashMap::new();
        let mut concepts: Vec<LevelEntry> = Vec::new();
        let mut linked: HashSet<(NodeId, String)> = HashSet::new();

        for mention in mentions {
            stats.mentions += 1;
            let sentence = *sentences
                .get(&mention.sentence_id)
                .ok_or_else(|| AssemblyError::UnknownSentence(mention.sentence_id.clone()))?;

            let resolved = match resolutions.get(&mention.key()) {
                Some(Ok(Resolution::Resolved(concept))) => concept,
                Some(Ok(Resolution::NotFound)) => {
                    stats.unmatched_mentions += 1;
                    continue;
                }
                Some(Err(_)) | None => {
                    stats.unavailable_mentions += 1;
                    continue;
                }
            };

            let idx = *concept_index
                .entry(resolved.canonical_id.clone())
                .or_insert_with(|| {
                    concepts.push(LevelEntry {
                        node: self.concept_node(
                            &resolved.canonical_id,
                            &resolved.label,
                            &resolved.description,
                        ),
                        edges: Vec::new(),
                    });
                    concepts.len() - 1
                });

            if linked.insert((sentence.id.clone(), resolved.canonical_id.clone())) {
                let pair = edge_pair(sentence, &concepts[idx].node)?;
                concepts[idx].edges.extend(pair);
                stats.concept_links += 1;
            }
        }

        stats.concepts = concepts.len();
        if !concepts.is_empty() {
            levels.push(Level {
                depth: levels.len(),
                entries: concepts,
            });
        }

        debug!(
            "assembled {}: {} hierarchy nodes, {} concepts, {} links",
            tree.book_id(),
            stats.hierarchy_nodes,
            stats.concepts,
            stats.concept_links
        );
        Ok(AssembledGraph {
            book_id: tree.book_id().clone(),
            levels,
            stats,
        })
    }

    fn concept_node(&self, canonical_id: &str, label: &str, description: &str) -> Node {
        Node::new(NodeId::concept(canonical_id), NodeKind::Concept)
            .with_title(label)
            .with_text(description)
            .with_source(format!("{}:{}", self.knowledge_base, canonical_id))
            .with_property("canonical_id", PropertyValue::String(canonical_id.to_string()))
    }
}
