//! Sentence segmentation
//!
//! The parser depends only on the [`Segmenter`] trait. [`RuleSegmenter`] is a
//! punctuation-driven splitter that understands common abbreviations; a
//! model-backed splitter can be dropped in behind the same trait.

use std::collections::HashSet;

/// Byte range of one sentence inside the segmented text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Splits text into an ordered sequence of sentence spans.
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<Span>;
}

const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "e.g", "i.e", "etc", "vs", "cf", "al", "fig", "figs", "eq", "approx", "ca", "dr", "mr", "mrs",
    "ms", "prof", "st", "no", "vol", "ch", "sec",
];

/// Splits on `.`, `!` and `?` followed by whitespace or end of text.
///
/// Terminal punctuation (and any closing quote or bracket after it) stays
/// with its sentence. Fragments shorter than `min_chars` characters or
/// without any alphanumeric character are dropped.
#[derive(Debug, Clone)]
pub struct RuleSegmenter {
    abbreviations: HashSet<String>,
    min_chars: usize,
}

impl Default for RuleSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSegmenter {
    pub fn new() -> Self {
        Self {
            abbreviations: DEFAULT_ABBREVIATIONS.iter().map(|a| a.to_string()).collect(),
            min_chars: 3,
        }
    }

    /// Add an abbreviation (without its trailing period) that must not end a sentence.
    pub fn with_abbreviation(mut self, abbreviation: &str) -> Self {
        self.abbreviations
            .insert(abbreviation.trim_end_matches('.').to_lowercase());
        self
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    /// Whether the word right before a period is an abbreviation or an initial.
    fn ends_with_abbreviation(&self, prefix: &str) -> bool {
        let word = prefix
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| c == '(' || c == '"' || c == '\'');
        if word.is_empty() {
            return false;
        }
        let mut chars = word.chars();
        if let (Some(first), None) = (chars.next(), chars.next()) {
            if first.is_uppercase() {
                return true;
            }
        }
        self.abbreviations.contains(&word.to_lowercase())
    }

    fn push_span(&self, text: &str, start: usize, end: usize, spans: &mut Vec<Span>) {
        let slice = &text[start..end];
        let leading = slice.len() - slice.trim_start().len();
        let trailing = slice.len() - slice.trim_end().len();
        let span = Span {
            start: start + leading,
            end: end - trailing,
        };
        if span.start >= span.end {
            return;
        }
        let sentence = span.slice(text);
        if sentence.chars().count() < self.min_chars {
            return;
        }
        if !sentence.chars().any(char::is_alphanumeric) {
            return;
        }
        if sentence.chars().all(|c| c.is_ascii_digit() || c.is_ascii_punctuation()) {
            return;
        }
        spans.push(span);
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}')
}

impl Segmenter for RuleSegmenter {
    fn segment(&self, text: &str) -> Vec<Span> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut spans = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            let (pos, c) = chars[i];
            if !is_terminator(c) {
                i += 1;
                continue;
            }

            let mut j = i + 1;
            while j < chars.len() && (is_terminator(chars[j].1) || is_closer(chars[j].1)) {
                j += 1;
            }
            let end = chars.get(j).map(|(p, _)| *p).unwrap_or(text.len());
            let at_boundary = chars.get(j).map(|(_, c)| c.is_whitespace()).unwrap_or(true);
            let abbreviated = c == '.' && self.ends_with_abbreviation(&text[start..pos]);

            if at_boundary && !abbreviated {
                self.push_span(text, start, end, &mut spans);
                start = end;
            }
            i = j;
        }

        if start < text.len() {
            self.push_span(text, start, text.len(), &mut spans);
        }
        spans
    }
}
