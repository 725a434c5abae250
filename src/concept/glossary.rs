//! Fixed-vocabulary extraction

use super::{Candidate, ConceptExtractor};
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Case-insensitive, word-bounded matching of a curated term list.
pub struct GlossaryExtractor {
    patterns: Vec<Regex>,
}

impl GlossaryExtractor {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        for term in terms {
            let words: Vec<String> = term
                .as_ref()
                .split_whitespace()
                .map(regex::escape)
                .collect();
            if words.is_empty() {
                continue;
            }
            let pattern = format!(r"\b{}\b", words.join(r"\s+"));
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(re) => patterns.push(re),
                Err(e) => warn!("ignoring glossary term {:?}: {}", term.as_ref(), e),
            }
        }
        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl ConceptExtractor for GlossaryExtractor {
    fn extract(&self, text: &str) -> Vec<Candidate> {
        let mut found: Vec<Candidate> = self
            .patterns
            .iter()
            .flat_map(|re| re.find_iter(text))
            .map(|m| Candidate::from_span(text, m.start(), m.end()))
            .collect();
        // text order, longer match first at the same start
        found.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        found
    }
}
