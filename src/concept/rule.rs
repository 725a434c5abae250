//! Heuristic extraction of single terms and short phrases
//!
//! Words are split on whitespace and stripped of surrounding punctuation.
//! Stop words, generic terms, numbers, URLs and e-mail addresses break
//! phrases; punctuation at a word edge also ends the current phrase.

use super::{Candidate, ConceptExtractor};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "either",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "him", "his", "how", "however", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "may", "me", "might", "more", "most", "much", "must", "my", "no", "nor", "not", "now", "of",
    "off", "on", "once", "one", "only", "or", "other", "our", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "within", "without", "would", "you", "your",
];

const GENERIC_TERMS: &[&str] = &[
    "sentence", "paragraph", "text", "content", "information", "data", "thing", "way", "time",
    "year", "work", "case", "group", "number", "system", "process", "method", "result", "study",
    "research", "analysis", "example", "type", "kind", "form", "part", "area", "use", "used",
    "using", "made", "making", "take", "taken", "taking",
];

fn url_or_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(https?://|www\.)|^[^\s@]+@[^\s@]+\.[a-z]{2,}$").expect("static regex")
    })
}

#[derive(Debug, Clone, Copy)]
struct Word {
    start: usize,
    end: usize,
    content: bool,
    break_before: bool,
    break_after: bool,
}

/// Default extractor: content words of three or more letters, plus runs of
/// two to four consecutive content words as phrase candidates.
pub struct RuleExtractor {
    stop_words: HashSet<String>,
    min_letters: usize,
    max_phrase_words: usize,
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleExtractor {
    pub fn new() -> Self {
        Self {
            stop_words: STOP_WORDS
                .iter()
                .chain(GENERIC_TERMS)
                .map(|w| w.to_string())
                .collect(),
            min_letters: 3,
            max_phrase_words: 4,
        }
    }

    /// Treat an extra word as non-content.
    pub fn with_stop_word(mut self, word: &str) -> Self {
        self.stop_words.insert(word.to_lowercase());
        self
    }

    pub fn with_max_phrase_words(mut self, max: usize) -> Self {
        self.max_phrase_words = max;
        self
    }

    fn is_content(&self, raw: &str, word: &str) -> bool {
        if word.chars().count() < 2 || !word.chars().any(char::is_alphabetic) {
            return false;
        }
        if word.chars().any(|c| c.is_ascii_digit()) || url_or_email().is_match(raw) {
            return false;
        }
        !self.stop_words.contains(&word.to_lowercase())
    }

    fn words(&self, text: &str) -> Vec<Word> {
        let mut words = Vec::new();
        let mut offset = 0;
        for raw in text.split_whitespace() {
            // split_whitespace yields subslices in order; recover the offset
            let start = offset + text[offset..].find(raw).unwrap_or(0);
            let end = start + raw.len();
            offset = end;

            let core = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if core.is_empty() {
                words.push(Word {
                    start,
                    end,
                    content: false,
                    break_before: true,
                    break_after: true,
                });
                continue;
            }
            let lead = raw.len() - raw.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
            let core_start = start + lead;
            words.push(Word {
                start: core_start,
                end: core_start + core.len(),
                content: self.is_content(raw, core),
                break_before: lead > 0,
                break_after: core_start + core.len() < end,
            });
        }
        words
    }

    fn emit_run(&self, text: &str, run: &[Word], out: &mut Vec<Candidate>) {
        if (2..=self.max_phrase_words).contains(&run.len()) {
            out.push(Candidate::from_span(text, run[0].start, run[run.len() - 1].end));
        }
        for word in run {
            let letters = text[word.start..word.end].chars().filter(|c| c.is_alphabetic()).count();
            if letters >= self.min_letters {
                out.push(Candidate::from_span(text, word.start, word.end));
            }
        }
    }
}

impl ConceptExtractor for RuleExtractor {
    fn extract(&self, text: &str) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut run: Vec<Word> = Vec::new();
        for word in self.words(text) {
            if !word.content || word.break_before {
                self.emit_run(text, &run, &mut out);
                run.clear();
            }
            if !word.content {
                continue;
            }
            run.push(word);
            if word.break_after {
                self.emit_run(text, &run, &mut out);
                run.clear();
            }
        }
        self.emit_run(text, &run, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surfaces(text: &str) -> Vec<String> {
        RuleExtractor::new()
            .extract(text)
            .into_iter()
            .map(|c| c.surface)
            .collect()
    }

    #[test]
    fn content_words_and_phrases() {
        assert_eq!(
            surfaces("The mitochondria is the powerhouse of the cell."),
            vec!["mitochondria", "powerhouse", "cell"]
        );
        assert_eq!(
            surfaces("Plasma membrane proteins move."),
            vec!["Plasma membrane proteins move", "Plasma", "membrane", "proteins", "move"]
        );
    }

    #[test]
    fn punctuation_ends_a_phrase() {
        assert_eq!(
            surfaces("Nucleus, ribosome"),
            vec!["Nucleus", "ribosome"]
        );
    }

    #[test]
    fn numbers_urls_emails_and_generic_terms_are_rejected() {
        assert!(surfaces("In 1953 at https://example.org or bio@example.org").is_empty());
        assert!(surfaces("This example shows the process.").iter().all(|s| s == "shows"));
    }

    #[test]
    fn offsets_point_into_source() {
        let text = "(Enzymes) catalyze reactions.";
        for c in RuleExtractor::new().extract(text) {
            assert_eq!(&text[c.start..c.end], c.surface);
        }
    }

    #[test]
    fn long_runs_emit_only_single_words() {
        let found = surfaces("alpha beta gamma delta epsilon");
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn custom_stop_word() {
        let ex = RuleExtractor::new().with_stop_word("Cell");
        let found: Vec<_> = ex.extract("the cell").into_iter().map(|c| c.surface).collect();
        assert!(found.is_empty());
    }
}
