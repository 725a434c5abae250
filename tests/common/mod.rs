//! Shared fixtures for folio integration tests
//!
//! Writes small OpenStax-style textbook directories and wires pipelines to a
//! mock knowledge base, a file-backed SQLite store and a file-backed cache.

#![allow(dead_code)]

use folio::concept::RuleExtractor;
use folio::parse::RuleSegmenter;
use folio::resolve::{CachePolicy, ConceptCache, ConceptResolver, KbMatch, MockKnowledgeBase, RetryPolicy};
use folio::{GraphStore, IngestPipeline, IngestRequest, OpenStore, SqliteStore, TextbookParser};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const INTRO_MODULE: &str = r#"<?xml version="1.0"?>
<document xmlns="http://cnx.rice.edu/cnxml">
  <title>Intro</title>
  <content>
    <para id="p1">The mitochondria is the powerhouse of the cell.</para>
  </content>
</document>
"#;

/// Write `collections/{name}.collection.xml` with one chapter holding `modules`.
pub fn write_collection(root: &Path, name: &str, title: &str, chapter: &str, modules: &[&str]) {
    fs::create_dir_all(root.join("collections")).unwrap();
    let refs: String = modules
        .iter()
        .map(|m| format!("        <col:module document=\"{}\"/>\n", m))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0"?>
<col:collection xmlns:col="http://cnx.rice.edu/collxml" xmlns:md="http://cnx.rice.edu/mdml">
  <col:metadata>
    <md:title>{title}</md:title>
    <md:slug>{name}</md:slug>
  </col:metadata>
  <col:content>
    <col:subcollection>
      <md:title>{chapter}</md:title>
      <col:content>
{refs}      </col:content>
    </col:subcollection>
  </col:content>
</col:collection>
"#
    );
    fs::write(root.join("collections").join(format!("{}.collection.xml", name)), xml).unwrap();
}

pub fn write_module(root: &Path, id: &str, body: &str) {
    let dir = root.join("modules").join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("index.cnxml"), body).unwrap();
}

/// A module with one paragraph of the given text
pub fn paragraph_module(title: &str, text: &str) -> String {
    format!(
        r#"<document xmlns="http://cnx.rice.edu/cnxml"><title>{}</title><content><para>{}</para></content></document>"#,
        title, text
    )
}

/// Book("Bio") → Chapter("Cells") → Document("Intro") → Paragraph → one Sentence
pub fn write_bio(root: &Path) {
    write_collection(root, "bio", "Bio", "Cells", &["m1"]);
    write_module(root, "m1", INTRO_MODULE);
}

pub fn mitochondrion() -> KbMatch {
    KbMatch::new("Q9647", "mitochondrion").with_description("organelle in eukaryotic cells")
}

/// Knows "mitochondria" and its singular, both as Q9647
pub fn biology_kb() -> MockKnowledgeBase {
    MockKnowledgeBase::new()
        .with_entry("mitochondria", mitochondrion())
        .with_entry("mitochondrion", mitochondrion())
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: 0.0,
    }
}

/// Temporary textbook directory, database and cache file
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<SqliteStore>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("folio.db")).unwrap();
        store.setup_schema().unwrap();
        Self {
            dir,
            store: Arc::new(store),
        }
    }

    pub fn textbook(&self) -> PathBuf {
        self.dir.path().join("textbook")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("cache/concepts.json")
    }

    /// A pipeline over this harness; the cache file is reopened every call.
    pub fn pipeline(&self, kb: Arc<MockKnowledgeBase>) -> IngestPipeline {
        let cache = Arc::new(ConceptCache::open(self.cache_path(), CachePolicy::default()));
        let resolver = ConceptResolver::new(kb, cache)
            .with_timeout(Duration::from_secs(2))
            .with_retry(fast_retry());
        IngestPipeline::new(
            TextbookParser::new(Arc::new(RuleSegmenter::new())),
            Arc::new(RuleExtractor::new()),
            Arc::new(resolver),
            self.store.clone(),
        )
    }

    pub fn request(&self) -> IngestRequest {
        IngestRequest::new(self.textbook())
    }

    pub fn total_nodes(&self) -> usize {
        self.store.node_counts().unwrap().values().sum()
    }

    pub fn edge_count(&self, label: &str) -> usize {
        self.store.edge_counts().unwrap().get(label).copied().unwrap_or(0)
    }
}
