//! End-to-end ingestion against a file-backed store and cache

mod common;

use common::{biology_kb, paragraph_module, write_bio, write_collection, write_module, Harness};
use folio::import::verify_book;
use folio::resolve::{ConceptCache, KbError};
use folio::{BulkImporter, GraphStore, ImportMode, NodeId, NodeKind};
use std::sync::Arc;

#[tokio::test]
async fn bio_book_is_imported_with_its_concept() {
    let h = Harness::new();
    write_bio(&h.textbook());
    let kb = Arc::new(biology_kb());

    let report = h.pipeline(kb.clone()).run(&h.request()).await.unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.books.len(), 1);

    let counts = h.store.node_counts().unwrap();
    for kind in [
        NodeKind::Book,
        NodeKind::Chapter,
        NodeKind::Document,
        NodeKind::Paragraph,
        NodeKind::Sentence,
        NodeKind::Concept,
    ] {
        assert_eq!(counts.get(&kind), Some(&1), "{}", kind);
    }
    assert_eq!(h.total_nodes(), 6);

    for label in [
        "BOOK_CONTAINS_CHAPTER",
        "CHAPTER_BELONGS_TO_BOOK",
        "CHAPTER_CONTAINS_DOCUMENT",
        "DOCUMENT_BELONGS_TO_CHAPTER",
        "DOCUMENT_CONTAINS_PARAGRAPH",
        "PARAGRAPH_BELONGS_TO_DOCUMENT",
        "PARAGRAPH_CONTAINS_SENTENCE",
        "SENTENCE_BELONGS_TO_PARAGRAPH",
        "SENTENCE_CONTAINS_CONCEPT",
        "CONCEPT_BELONGS_IN_SENTENCE",
    ] {
        assert_eq!(h.edge_count(label), 1, "{}", label);
    }
    assert_eq!(h.store.edge_counts().unwrap().values().sum::<usize>(), 10);

    let concept = h.store.load_node(&NodeId::from("concept:Q9647")).unwrap().unwrap();
    assert_eq!(concept.title, "mitochondrion");
    let sentence = h.store.load_node(&NodeId::from("bio/chapter-1/document-1/paragraph-1/sentence-1")).unwrap().unwrap();
    assert_eq!(sentence.text, "The mitochondria is the powerhouse of the cell.");

    let cached = ConceptCache::load(&h.cache_path()).unwrap().unwrap();
    assert_eq!(cached["mitochondria"].canonical_id.as_deref(), Some("Q9647"));
    assert!(verify_book(h.store.as_ref(), &NodeId::from("bio")).unwrap().is_empty());
}

#[tokio::test]
async fn rerun_creates_nothing_and_hits_the_cache() {
    let h = Harness::new();
    write_bio(&h.textbook());
    h.pipeline(Arc::new(biology_kb())).run(&h.request()).await.unwrap();

    let kb = Arc::new(biology_kb());
    let report = h.pipeline(kb.clone()).run(&h.request()).await.unwrap();

    let import = report.books[0].import.unwrap();
    assert!(import.created_nothing());
    assert_eq!(import.nodes_updated, 6);
    assert_eq!(import.edges_existing, 10);
    // every form, matched or not, came from the cache file
    assert_eq!(kb.calls(), 0);
    assert_eq!(h.total_nodes(), 6);
}

#[tokio::test]
async fn cleanup_keeps_concept_and_cache_entry() {
    let h = Harness::new();
    write_bio(&h.textbook());
    h.pipeline(Arc::new(biology_kb())).run(&h.request()).await.unwrap();

    let deleted = BulkImporter::new(h.store.clone()).cleanup(&NodeId::from("bio")).unwrap();
    assert_eq!(deleted.nodes, 5);
    assert_eq!(deleted.edges, 10);

    assert_eq!(h.total_nodes(), 1);
    assert!(h.store.load_node(&NodeId::from("concept:Q9647")).unwrap().is_some());
    let cached = ConceptCache::load(&h.cache_path()).unwrap().unwrap();
    assert!(cached.contains_key("mitochondria"));

    // the orphaned concept goes only when asked
    assert_eq!(h.store.prune_orphan_concepts().unwrap(), 1);
    assert_eq!(h.total_nodes(), 0);
}

#[tokio::test]
async fn cleanup_mode_reimports_the_book() {
    let h = Harness::new();
    write_bio(&h.textbook());
    h.pipeline(Arc::new(biology_kb())).run(&h.request()).await.unwrap();

    let mut request = h.request();
    request.mode = ImportMode::Cleanup;
    let report = h.pipeline(Arc::new(biology_kb())).run(&request).await.unwrap();

    let import = report.books[0].import.unwrap();
    assert_eq!(import.deleted_nodes, 5);
    assert_eq!(import.nodes_created, 5);
    assert_eq!(import.nodes_updated, 1);
    assert_eq!(h.total_nodes(), 6);
}

#[tokio::test]
async fn two_forms_of_one_concept_share_a_node() {
    let h = Harness::new();
    write_collection(&h.textbook(), "bio", "Bio", "Cells", &["m1"]);
    write_module(
        &h.textbook(),
        "m1",
        &paragraph_module(
            "Intro",
            "The mitochondria is the powerhouse of the cell. Each mitochondrion has two membranes.",
        ),
    );
    let kb = Arc::new(biology_kb());

    let report = h.pipeline(kb.clone()).run(&h.request()).await.unwrap();
    assert!(report.is_success());

    assert_eq!(h.store.node_counts().unwrap().get(&NodeKind::Sentence), Some(&2));
    assert_eq!(h.store.node_counts().unwrap().get(&NodeKind::Concept), Some(&1));
    assert_eq!(h.edge_count("SENTENCE_CONTAINS_CONCEPT"), 2);
    assert_eq!(h.edge_count("CONCEPT_BELONGS_IN_SENTENCE"), 2);
    assert_eq!(kb.calls_for("mitochondria"), 1);
    assert_eq!(kb.calls_for("mitochondrion"), 1);
}

#[tokio::test]
async fn books_share_concepts_and_lookups() {
    let h = Harness::new();
    write_bio(&h.textbook());
    write_collection(&h.textbook(), "anatomy", "Anatomy", "Tissue", &["m9"]);
    write_module(
        &h.textbook(),
        "m9",
        &paragraph_module("Muscle", "Muscle cells are packed with mitochondria."),
    );
    let kb = Arc::new(biology_kb());

    let report = h.pipeline(kb.clone()).run(&h.request()).await.unwrap();
    assert_eq!(report.books.len(), 2);

    assert_eq!(h.store.list_books().unwrap().len(), 2);
    assert_eq!(h.store.node_counts().unwrap().get(&NodeKind::Concept), Some(&1));
    assert_eq!(h.edge_count("SENTENCE_CONTAINS_CONCEPT"), 2);
    assert_eq!(kb.calls_for("mitochondria"), 1);
    assert!(report.resolver.cache_hits >= 1);
}

#[tokio::test]
async fn collection_filter_loads_one_book() {
    let h = Harness::new();
    write_bio(&h.textbook());
    write_collection(&h.textbook(), "anatomy", "Anatomy", "Tissue", &["m1"]);

    let mut request = h.request();
    request.collection = Some("anatomy".into());
    let report = h.pipeline(Arc::new(biology_kb())).run(&request).await.unwrap();

    assert_eq!(report.books.len(), 1);
    assert_eq!(report.books[0].book_id.as_str(), "anatomy");
    let books = h.store.list_books().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Anatomy");
}

#[tokio::test]
async fn unavailable_knowledge_base_skips_mention_until_rerun() {
    let h = Harness::new();
    write_bio(&h.textbook());
    let down = Arc::new(biology_kb().with_failures("mitochondria", 10, KbError::Unavailable("503".into())));

    let report = h.pipeline(down.clone()).run(&h.request()).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.unavailable_mentions, 1);
    assert_eq!(down.calls_for("mitochondria"), 3);
    assert_eq!(h.total_nodes(), 5);
    assert_eq!(h.edge_count("SENTENCE_CONTAINS_CONCEPT"), 0);
    let cached = ConceptCache::load(&h.cache_path()).unwrap().unwrap();
    assert!(!cached.contains_key("mitochondria"));

    let report = h.pipeline(Arc::new(biology_kb())).run(&h.request()).await.unwrap();
    assert!(report.is_success());
    let import = report.books[0].import.unwrap();
    assert_eq!(import.nodes_created, 1);
    assert_eq!(import.edges_created, 2);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let h = Harness::new();
    write_bio(&h.textbook());
    let flaky = Arc::new(biology_kb().with_failures("mitochondria", 2, KbError::RateLimited));

    let report = h.pipeline(flaky.clone()).run(&h.request()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(flaky.calls_for("mitochondria"), 3);
    assert!(report.resolver.retries >= 2);
    assert_eq!(h.edge_count("SENTENCE_CONTAINS_CONCEPT"), 1);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let h = Harness::new();
    write_bio(&h.textbook());
    let rejecting = Arc::new(biology_kb().with_failures(
        "mitochondria",
        1,
        KbError::Rejected {
            status: 400,
            message: "bad search".into(),
        },
    ));

    let report = h.pipeline(rejecting.clone()).run(&h.request()).await.unwrap();
    assert_eq!(report.unavailable_mentions, 1);
    assert_eq!(rejecting.calls_for("mitochondria"), 1);
}

#[tokio::test]
async fn negative_results_are_cached_across_runs() {
    let h = Harness::new();
    write_bio(&h.textbook());
    let first = Arc::new(biology_kb());
    h.pipeline(first.clone()).run(&h.request()).await.unwrap();
    assert_eq!(first.calls_for("powerhouse"), 1);

    let cached = ConceptCache::load(&h.cache_path()).unwrap().unwrap();
    assert!(cached["powerhouse"].is_negative());

    let second = Arc::new(biology_kb());
    h.pipeline(second.clone()).run(&h.request()).await.unwrap();
    assert_eq!(second.calls_for("powerhouse"), 0);
}

#[tokio::test]
async fn malformed_module_is_skipped_and_reported() {
    let h = Harness::new();
    write_collection(&h.textbook(), "bio", "Bio", "Cells", &["m1", "m404"]);
    write_module(&h.textbook(), "m1", common::INTRO_MODULE);

    let report = h.pipeline(Arc::new(biology_kb())).run(&h.request()).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.malformed.len(), 1);
    assert!(report.malformed[0].path.to_string_lossy().contains("m404"));

    // the good module still made it in
    assert_eq!(h.store.node_counts().unwrap().get(&NodeKind::Document), Some(&1));
    assert!(verify_book(h.store.as_ref(), &NodeId::from("bio")).unwrap().is_empty());
}

#[tokio::test]
async fn ids_are_stable_across_independent_runs() {
    let a = Harness::new();
    let b = Harness::new();
    write_bio(&a.textbook());
    write_bio(&b.textbook());
    a.pipeline(Arc::new(biology_kb())).run(&a.request()).await.unwrap();
    b.pipeline(Arc::new(biology_kb())).run(&b.request()).await.unwrap();

    let ids = |h: &Harness| {
        let mut ids = h.store.book_subtree(&NodeId::from("bio")).unwrap();
        ids.sort();
        ids
    };
    assert_eq!(ids(&a), ids(&b));
    assert_eq!(ids(&a).len(), 5);
}
