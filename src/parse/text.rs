//! Text extraction and cleanup for markup elements

use regex::Regex;
use std::sync::OnceLock;

/// Elements whose text never belongs to the surrounding paragraph
const SKIPPED_ELEMENTS: &[&str] = &[
    "media", "figure", "table", "title", "caption", "footnote", "math", "image", "label",
];

/// Local (namespace-free) tag name check
pub(crate) fn is_element(node: &roxmltree::Node, local: &str) -> bool {
    node.is_element() && node.tag_name().name() == local
}

/// First direct child element with the given local name
pub(crate) fn child_element<'a, 'input>(
    node: &roxmltree::Node<'a, 'input>,
    local: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|c| is_element(c, local))
}

/// Cleaned text of the first direct child element with the given local name
pub(crate) fn child_text(node: &roxmltree::Node, local: &str) -> Option<String> {
    child_element(node, local)
        .map(|c| element_text(&c))
        .filter(|t| !t.is_empty())
}

/// All descendant text of an element, excluding non-prose subtrees, cleaned.
pub(crate) fn element_text(node: &roxmltree::Node) -> String {
    let mut raw = String::new();
    collect_text(node, &mut raw);
    clean_text(&raw)
}

fn collect_text(node: &roxmltree::Node, out: &mut String) {
    for child in node.children() {
        if child.is_text() {
            out.push_str(child.text().unwrap_or(""));
        } else if child.is_element() {
            let name = child.tag_name().name();
            if !SKIPPED_ELEMENTS.contains(&name) {
                // inline markup contributes its text; padding keeps words apart
                out.push(' ');
                collect_text(&child, out);
                out.push(' ');
            }
        }
    }
}

fn space_before_punct() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+([.,;:!?)\]])").expect("static regex"))
}

fn space_after_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([(\[])\s+").expect("static regex"))
}

/// Collapse whitespace runs to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace and remove spaces that markup padding leaves around punctuation.
pub fn clean_text(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    let tightened = space_before_punct().replace_all(&collapsed, "$1");
    space_after_open().replace_all(&tightened, "$1").into_owned()
}

/// Normalize a collection slug or file stem into a Book id.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut last_dash = true;
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_tightens_punctuation() {
        assert_eq!(
            clean_text("  The  cell ( a unit ) is small .\n Really ?"),
            "The cell (a unit) is small. Really?"
        );
    }

    #[test]
    fn slugify_normalizes() {
        assert_eq!(slugify("Biology 2e"), "biology-2e");
        assert_eq!(slugify("biology-2e.collection"), "biology-2e-collection");
        assert_eq!(slugify("  --Intro__to   Bio-- "), "intro-to-bio");
    }

    #[test]
    fn element_text_skips_media_and_keeps_inline_terms() {
        let xml = r#"<para id="p1">The <term>mitochondria</term> is the powerhouse<media><image src="x.png"/>alt text</media> of the <emphasis>cell</emphasis>.</para>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let text = element_text(&doc.root_element());
        assert_eq!(text, "The mitochondria is the powerhouse of the cell.");
    }

    #[test]
    fn element_text_skips_paragraph_title() {
        let xml = r#"<para><title>Aside</title>Body text here.</para>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        assert_eq!(element_text(&doc.root_element()), "Body text here.");
    }

    #[test]
    fn child_text_ignores_namespace_prefix() {
        let xml = r#"<col:metadata xmlns:col="http://cnx.rice.edu/collxml" xmlns:md="http://cnx.rice.edu/mdml"><md:title>Bio</md:title></col:metadata>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        assert_eq!(child_text(&doc.root_element(), "title").as_deref(), Some("Bio"));
        assert_eq!(child_text(&doc.root_element(), "slug"), None);
    }
}
