//! Parser for OpenStax-style textbook directories
//!
//! A textbook directory holds `collections/*.xml` (CollXML, one Book each)
//! and `modules/<id>/index.cnxml` (CNXML, one Document each). Collections
//! reference modules by id; modules carry the section/paragraph content.
//!
//! Mapping:
//! - top-level `subcollection` → Chapter, nested → Subchapter (deeper
//!   nesting is flattened into the Subchapter)
//! - `module` → Document
//! - `section` under `content` → Section, inside a Section → Subsection
//!   (deeper sections are flattened into the Subsection)
//! - `para` → Paragraph, split into Sentences by the [`Segmenter`]

use super::segment::{RuleSegmenter, Segmenter};
use super::text::{child_element, child_text, element_text, slugify};
use super::tree::{BookTree, TreeNode};
use crate::graph::{Node, NodeId, NodeKind, PropertyValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A collection or module that cannot be turned into a valid hierarchy.
///
/// The offending document is skipped; the rest of the batch continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed source {}: {reason}", path.display())]
pub struct MalformedSourceError {
    pub path: PathBuf,
    pub reason: String,
}

impl MalformedSourceError {
    fn new(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Errors that stop parsing of a whole textbook directory
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not a textbook directory (missing collections/): {}", .0.display())]
    NotATextbook(PathBuf),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of parsing a textbook directory
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub books: Vec<BookTree>,
    /// Documents and collections that were skipped
    pub errors: Vec<MalformedSourceError>,
}

/// Collection name used for filtering and listing (`biology-2e`)
pub fn collection_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.trim_end_matches(".collection").to_string()
}

/// Collection files of a textbook directory, sorted by file name
pub fn list_collections(root: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let dir = root.join("collections");
    if !dir.is_dir() {
        return Err(SourceError::NotATextbook(root.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "xml").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Location of one parsed file, for `source_ref` strings
struct SourceFile<'a, 'input> {
    relative: String,
    doc: &'a roxmltree::Document<'input>,
}

impl SourceFile<'_, '_> {
    fn position(&self, node: &roxmltree::Node) -> String {
        let pos = self.doc.text_pos_at(node.range().start);
        format!("{}:{}:{}", self.relative, pos.row, pos.col)
    }
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Turns textbook markup into [`BookTree`]s.
#[derive(Clone)]
pub struct TextbookParser {
    segmenter: Arc<dyn Segmenter>,
}

impl Default for TextbookParser {
    fn default() -> Self {
        Self::new(Arc::new(RuleSegmenter::new()))
    }
}

impl TextbookParser {
    pub fn new(segmenter: Arc<dyn Segmenter>) -> Self {
        Self { segmenter }
    }

    /// Parse every collection of a textbook directory.
    ///
    /// `only` restricts parsing to one collection (`biology-2e` or
    /// `biology-2e.collection.xml`). Malformed collections and modules are
    /// reported in [`ParseOutcome::errors`] and skipped.
    pub fn parse_textbook(&self, root: &Path, only: Option<&str>) -> Result<ParseOutcome, SourceError> {
        let mut files = list_collections(root)?;
        if let Some(wanted) = only {
            let wanted = wanted.trim_end_matches(".xml").trim_end_matches(".collection");
            files.retain(|f| collection_name(f) == wanted);
            if files.is_empty() {
                return Err(SourceError::CollectionNotFound(wanted.to_string()));
            }
        }

        let mut outcome = ParseOutcome::default();
        for file in files {
            match self.parse_collection(root, &file) {
                Ok((book, errors)) => {
                    outcome.books.push(book);
                    outcome.errors.extend(errors);
                }
                Err(e) => {
                    warn!("skipping collection: {}", e);
                    outcome.errors.push(e);
                }
            }
        }
        Ok(outcome)
    }

    /// Parse one collection file into a Book tree.
    ///
    /// Returns the tree plus the errors of modules that were skipped, or an
    /// error when the collection itself is unusable.
    pub fn parse_collection(
        &self,
        root: &Path,
        path: &Path,
    ) -> Result<(BookTree, Vec<MalformedSourceError>), MalformedSourceError> {
        let xml = std::fs::read_to_string(path)
            .map_err(|e| MalformedSourceError::new(path, format!("cannot read collection: {}", e)))?;
        let doc = roxmltree::Document::parse(&xml)
            .map_err(|e| MalformedSourceError::new(path, format!("invalid XML: {}", e)))?;
        let src = SourceFile {
            relative: relative(root, path),
            doc: &doc,
        };

        let collection = doc.root_element();
        let metadata = child_element(&collection, "metadata");
        let name = collection_name(path);
        let slug = metadata
            .as_ref()
            .and_then(|m| child_text(m, "slug"))
            .unwrap_or_else(|| name.clone());
        let title = metadata
            .as_ref()
            .and_then(|m| child_text(m, "title"))
            .unwrap_or_else(|| name.clone());

        let book_id = slugify(&slug);
        if book_id.is_empty() {
            return Err(MalformedSourceError::new(path, "collection has no usable slug or file name"));
        }
        let content = child_element(&collection, "content")
            .ok_or_else(|| MalformedSourceError::new(path, "collection has no content element"))?;

        let book = Node::new(NodeId::from_string(book_id), NodeKind::Book)
            .with_title(title)
            .with_source(src.position(&collection))
            .with_property("collection", PropertyValue::String(name));
        let mut root_node = TreeNode::new(book);
        let mut errors = Vec::new();
        self.walk_collection(root, path, &src, content, &mut root_node, &mut errors);

        let tree = BookTree {
            root: root_node,
            source: path.to_path_buf(),
        };
        info!(
            "parsed collection '{}': {} nodes, {} skipped documents",
            tree.book_id(),
            tree.node_count(),
            errors.len()
        );
        Ok((tree, errors))
    }

    fn walk_collection(
        &self,
        root: &Path,
        path: &Path,
        src: &SourceFile,
        content: roxmltree::Node,
        parent: &mut TreeNode,
        errors: &mut Vec<MalformedSourceError>,
    ) {
        for child in content.children().filter(|c| c.is_element()) {
            match child.tag_name().name() {
                "subcollection" => {
                    let kind = match parent.node.kind {
                        NodeKind::Book => NodeKind::Chapter,
                        NodeKind::Chapter => NodeKind::Subchapter,
                        _ => {
                            if let Some(inner) = child_element(&child, "content") {
                                self.walk_collection(root, path, src, inner, parent, errors);
                            }
                            continue;
                        }
                    };
                    let (order, id) = parent.next_child_slot(kind);
                    let node = Node::new(id, kind)
                        .with_title(child_text(&child, "title").unwrap_or_default())
                        .with_order(order)
                        .with_source(src.position(&child));
                    let mut sub = TreeNode::new(node);
                    if let Some(inner) = child_element(&child, "content") {
                        self.walk_collection(root, path, src, inner, &mut sub, errors);
                    }
                    parent.children.push(sub);
                }
                "module" => {
                    let Some(module_id) = child.attribute("document") else {
                        errors.push(MalformedSourceError::new(
                            path,
                            format!("module reference without document attribute at {}", src.position(&child)),
                        ));
                        continue;
                    };
                    if parent.node.kind == NodeKind::Book {
                        errors.push(MalformedSourceError::new(
                            path,
                            format!("module {} has no enclosing chapter", module_id),
                        ));
                        continue;
                    }
                    match self.parse_module(root, module_id, parent) {
                        Ok(document) => parent.children.push(document),
                        Err(e) => {
                            warn!("skipping module: {}", e);
                            errors.push(e);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Parse `modules/<id>/index.cnxml` into a Document subtree for `parent`.
    fn parse_module(&self, root: &Path, module_id: &str, parent: &TreeNode) -> Result<TreeNode, MalformedSourceError> {
        let path = root.join("modules").join(module_id).join("index.cnxml");
        let xml = std::fs::read_to_string(&path)
            .map_err(|e| MalformedSourceError::new(&path, format!("cannot read module: {}", e)))?;
        let doc = roxmltree::Document::parse(&xml)
            .map_err(|e| MalformedSourceError::new(&path, format!("invalid XML: {}", e)))?;
        let src = SourceFile {
            relative: relative(root, &path),
            doc: &doc,
        };

        let document = doc.root_element();
        let content = child_element(&document, "content")
            .ok_or_else(|| MalformedSourceError::new(&path, "module has no content element"))?;
        let title = child_text(&document, "title")
            .or_else(|| child_element(&document, "metadata").and_then(|m| child_text(&m, "title")))
            .unwrap_or_else(|| format!("Module {}", module_id));

        let (order, id) = parent.next_child_slot(NodeKind::Document);
        let node = Node::new(id, NodeKind::Document)
            .with_title(title)
            .with_order(order)
            .with_source(src.position(&document))
            .with_property("module_id", PropertyValue::String(module_id.to_string()));
        let mut tree = TreeNode::new(node);
        self.walk_module(&src, content, &mut tree);
        debug!("parsed module {} into {}", module_id, tree.node.id);
        Ok(tree)
    }

    fn walk_module(&self, src: &SourceFile, element: roxmltree::Node, parent: &mut TreeNode) {
        for child in element.children().filter(|c| c.is_element()) {
            match child.tag_name().name() {
                "section" => {
                    let kind = match parent.node.kind {
                        NodeKind::Document => NodeKind::Section,
                        NodeKind::Section => NodeKind::Subsection,
                        _ => {
                            self.walk_module(src, child, parent);
                            continue;
                        }
                    };
                    let (order, id) = parent.next_child_slot(kind);
                    let mut node = Node::new(id, kind)
                        .with_title(child_text(&child, "title").unwrap_or_default())
                        .with_order(order)
                        .with_source(src.position(&child));
                    if let Some(xml_id) = child.attribute("id") {
                        node = node.with_property("xml_id", PropertyValue::String(xml_id.to_string()));
                    }
                    // empty sections stay as structural nodes
                    let mut section = TreeNode::new(node);
                    self.walk_module(src, child, &mut section);
                    parent.children.push(section);
                }
                "para" => {
                    if let Some(paragraph) = self.paragraph(src, child, parent) {
                        parent.children.push(paragraph);
                    }
                }
                _ => {}
            }
        }
    }

    /// Paragraph with its sentences, or `None` when it has no usable text.
    fn paragraph(&self, src: &SourceFile, element: roxmltree::Node, parent: &TreeNode) -> Option<TreeNode> {
        let text = element_text(&element);
        if text.is_empty() {
            return None;
        }
        let spans = self.segmenter.segment(&text);
        if spans.is_empty() {
            debug!("dropping paragraph without sentences at {}", src.position(&element));
            return None;
        }

        let (order, id) = parent.next_child_slot(NodeKind::Paragraph);
        let source = src.position(&element);
        let mut node = Node::new(id, NodeKind::Paragraph)
            .with_text(text.clone())
            .with_order(order)
            .with_source(source.clone());
        if let Some(xml_id) = element.attribute("id") {
            node = node.with_property("xml_id", PropertyValue::String(xml_id.to_string()));
        }

        let mut paragraph = TreeNode::new(node);
        for span in spans {
            let (order, id) = paragraph.next_child_slot(NodeKind::Sentence);
            let sentence = Node::new(id, NodeKind::Sentence)
                .with_text(span.slice(&text))
                .with_order(order)
                .with_source(format!("{}#{}..{}", source, span.start, span.end));
            paragraph.children.push(TreeNode::new(sentence));
        }
        Some(paragraph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const COLLECTION: &str = r#"<?xml version="1.0"?>
<col:collection xmlns:col="http://cnx.rice.edu/collxml" xmlns:md="http://cnx.rice.edu/mdml">
  <col:metadata>
    <md:title>Bio</md:title>
    <md:slug>bio</md:slug>
  </col:metadata>
  <col:content>
    <col:subcollection>
      <md:title>Cells</md:title>
      <col:content>
        <col:module document="m1"/>
        <col:subcollection>
          <md:title>Organelles</md:title>
          <col:content>
            <col:module document="m2"/>
          </col:content>
        </col:subcollection>
      </col:content>
    </col:subcollection>
  </col:content>
</col:collection>
"#;

    const MODULE_M1: &str = r#"<?xml version="1.0"?>
<document xmlns="http://cnx.rice.edu/cnxml">
  <title>Intro</title>
  <content>
    <para id="p1">The mitochondria is the powerhouse of the cell.</para>
    <section id="s1">
      <title>Membranes</title>
      <para>Membranes surround cells. They are <term>lipid</term> bilayers.</para>
      <section>
        <title>Details</title>
        <para>Proteins float in membranes.</para>
        <section><para>Deep text is flattened here.</para></section>
      </section>
    </section>
    <section><title>Empty</title></section>
    <para>   </para>
  </content>
</document>
"#;

    const MODULE_M2: &str = r#"<document xmlns="http://cnx.rice.edu/cnxml">
  <metadata xmlns:md="http://cnx.rice.edu/mdml"><md:title>Ribosomes</md:title></metadata>
  <content><para>Ribosomes build proteins.</para></content>
</document>
"#;

    fn write_textbook(root: &Path) {
        fs::create_dir_all(root.join("collections")).unwrap();
        fs::write(root.join("collections/bio.collection.xml"), COLLECTION).unwrap();
        for (id, body) in [("m1", MODULE_M1), ("m2", MODULE_M2)] {
            fs::create_dir_all(root.join("modules").join(id)).unwrap();
            fs::write(root.join("modules").join(id).join("index.cnxml"), body).unwrap();
        }
    }

    fn parse_single(root: &Path) -> ParseOutcome {
        TextbookParser::default().parse_textbook(root, None).unwrap()
    }

    #[test]
    fn maps_collection_and_modules_to_hierarchy() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        let outcome = parse_single(dir.path());
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert_eq!(outcome.books.len(), 1);

        let book = &outcome.books[0];
        assert_eq!(book.book_id().as_str(), "bio");
        assert_eq!(book.title(), "Bio");

        let chapter = &book.root.children[0];
        assert_eq!(chapter.node.kind, NodeKind::Chapter);
        assert_eq!(chapter.node.title, "Cells");
        assert_eq!(chapter.children[0].node.kind, NodeKind::Document);
        assert_eq!(chapter.children[0].node.title, "Intro");
        assert_eq!(chapter.children[1].node.kind, NodeKind::Subchapter);
        assert_eq!(chapter.children[1].node.id.as_str(), "bio/chapter-1/subchapter-2");

        let m2 = &chapter.children[1].children[0];
        assert_eq!(m2.node.title, "Ribosomes");
        assert_eq!(
            m2.node.properties.get("module_id"),
            Some(&PropertyValue::String("m2".into()))
        );
    }

    #[test]
    fn sections_nest_and_flatten() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        let outcome = parse_single(dir.path());
        let intro = &outcome.books[0].root.children[0].children[0];

        let kinds: Vec<_> = intro.children.iter().map(|c| c.node.kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Paragraph, NodeKind::Section, NodeKind::Section]
        );

        let section = &intro.children[1];
        assert_eq!(section.node.title, "Membranes");
        let subsection = &section.children[1];
        assert_eq!(subsection.node.kind, NodeKind::Subsection);
        // the third-level section's paragraph lands in the Subsection
        assert_eq!(subsection.children.len(), 2);
        assert!(subsection.children.iter().all(|c| c.node.kind == NodeKind::Paragraph));

        // empty section kept, blank paragraph dropped
        assert_eq!(intro.children[2].node.title, "Empty");
        assert!(intro.children[2].children.is_empty());
    }

    #[test]
    fn paragraphs_split_into_sentences_with_offsets() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        let outcome = parse_single(dir.path());
        let section = &outcome.books[0].root.children[0].children[0].children[1];
        let para = &section.children[0];

        assert_eq!(para.node.text, "Membranes surround cells. They are lipid bilayers.");
        let sentences: Vec<_> = para.children.iter().map(|s| s.node.text.as_str()).collect();
        assert_eq!(sentences, vec!["Membranes surround cells.", "They are lipid bilayers."]);
        assert_eq!(para.children[1].node.order, 2);
        assert!(para.children[1].node.source_ref.ends_with("#26..50"));
        assert!(para.node.source_ref.starts_with("modules/m1/index.cnxml:"));
    }

    #[test]
    fn ids_are_deterministic_across_parses() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        let first: Vec<_> = parse_single(dir.path()).books[0]
            .walk()
            .iter()
            .map(|v| v.node.id.clone())
            .collect();
        let second: Vec<_> = parse_single(dir.path()).books[0]
            .walk()
            .iter()
            .map(|v| v.node.id.clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_module_is_reported_and_skipped() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        fs::remove_dir_all(dir.path().join("modules/m2")).unwrap();

        let outcome = parse_single(dir.path());
        assert_eq!(outcome.books.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].path.ends_with("modules/m2/index.cnxml"));
        // the subchapter survives without its document
        let sub = &outcome.books[0].root.children[0].children[1];
        assert!(sub.children.is_empty());
    }

    #[test]
    fn module_at_book_level_is_malformed() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        let collection = r#"<collection><metadata><title>Flat</title></metadata>
            <content><module document="m1"/></content></collection>"#;
        fs::write(dir.path().join("collections/flat.collection.xml"), collection).unwrap();

        let outcome = TextbookParser::default()
            .parse_textbook(dir.path(), Some("flat"))
            .unwrap();
        assert_eq!(outcome.books.len(), 1);
        assert!(outcome.books[0].root.children.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].reason.contains("no enclosing chapter"));
    }

    #[test]
    fn unparseable_collection_is_skipped() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        fs::write(dir.path().join("collections/broken.xml"), "<collection><content>").unwrap();

        let outcome = parse_single(dir.path());
        assert_eq!(outcome.books.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].reason.starts_with("invalid XML"));
    }

    #[test]
    fn module_without_content_is_malformed() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        fs::write(
            dir.path().join("modules/m2/index.cnxml"),
            "<document><title>No body</title></document>",
        )
        .unwrap();

        let outcome = parse_single(dir.path());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].reason, "module has no content element");
    }

    #[test]
    fn collection_filter_and_listing() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        let listed = list_collections(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(collection_name(&listed[0]), "bio");

        let parser = TextbookParser::default();
        assert_eq!(
            parser
                .parse_textbook(dir.path(), Some("bio.collection.xml"))
                .unwrap()
                .books
                .len(),
            1
        );
        assert!(matches!(
            parser.parse_textbook(dir.path(), Some("chemistry")),
            Err(SourceError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn directory_without_collections_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            TextbookParser::default().parse_textbook(dir.path(), None),
            Err(SourceError::NotATextbook(_))
        ));
    }

    #[test]
    fn tree_edges_follow_schema() {
        let dir = tempdir().unwrap();
        write_textbook(dir.path());
        let book = parse_single(dir.path()).books.remove(0);
        let edges = book.edges().unwrap();
        assert_eq!(edges.len(), (book.node_count() - 1) * 2);
        assert!(edges.iter().any(|e| e.label == "SUBCHAPTER_CONTAINS_DOCUMENT"));
        assert!(edges.iter().any(|e| e.label == "SUBSECTION_BELONGS_TO_SECTION"));
    }
}
