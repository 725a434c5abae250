//! Concept extraction: sentence text → deduplicated concept mentions
//!
//! Extraction policy sits behind [`ConceptExtractor`]; the pipeline only ever
//! sees `Arc<dyn ConceptExtractor>`.

mod glossary;
mod rule;

pub use glossary::GlossaryExtractor;
pub use rule::RuleExtractor;

use crate::graph::{Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A candidate surface form with byte offsets into its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub surface: String,
    pub start: usize,
    pub end: usize,
}

impl Candidate {
    pub fn from_span(text: &str, start: usize, end: usize) -> Self {
        Self {
            surface: text[start..end].to_string(),
            start,
            end,
        }
    }
}

/// Finds candidate concept surface forms in one piece of text.
pub trait ConceptExtractor: Send + Sync {
    /// Candidates in text order; may contain duplicates and overlaps
    fn extract(&self, text: &str) -> Vec<Candidate>;
}

/// One occurrence of a concept candidate in a Sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMention {
    pub surface_form: String,
    pub sentence_id: NodeId,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl ConceptMention {
    /// Resolution and cache key for this mention
    pub fn key(&self) -> String {
        normalize_surface(&self.surface_form)
    }
}

/// Case-fold, trim and collapse internal whitespace.
pub fn normalize_surface(surface: &str) -> String {
    surface
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Mentions of one Sentence, deduplicated by normalized surface form.
///
/// The first occurrence of each form wins; overlapping but distinct forms
/// are all kept.
pub fn extract_mentions(extractor: &dyn ConceptExtractor, sentence: &Node) -> Vec<ConceptMention> {
    let mut seen = HashSet::new();
    let mut mentions = Vec::new();
    for candidate in extractor.extract(&sentence.text) {
        let key = normalize_surface(&candidate.surface);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        mentions.push(ConceptMention {
            surface_form: candidate.surface,
            sentence_id: sentence.id.clone(),
            start_offset: candidate.start,
            end_offset: candidate.end,
        });
    }
    mentions
}
