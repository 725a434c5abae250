//! End-to-end ingestion of a textbook directory
//!
//! Per Book: parse → extract mentions → resolve every distinct key
//! concurrently → assemble → import level by level. The concept cache is
//! shared by all Books of a run and flushed once at the end.

use crate::assemble::{AssemblyError, AssemblyStats, GraphAssembler};
use crate::concept::{extract_mentions, ConceptExtractor, ConceptMention};
use crate::config::{ConfigError, IngestConfig};
use crate::graph::NodeId;
use crate::import::{BulkImporter, CancellationToken, ImportError, ImportMode, ImportReport};
use crate::parse::{BookTree, MalformedSourceError, SourceError, TextbookParser};
use crate::resolve::{CacheStats, ConceptCache, ConceptResolver, KnowledgeBase, ResolverStats};
use crate::storage::{GraphStore, StorageError};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{info, warn};

/// Errors that stop a whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker task failed: {0}")]
    Join(#[from] JoinError),
}

/// What to ingest and how
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub textbook_path: PathBuf,
    /// Restrict the run to one collection
    pub collection: Option<String>,
    pub mode: ImportMode,
    /// Parse, resolve and assemble, but write nothing to the store
    pub dry_run: bool,
}

impl IngestRequest {
    pub fn new(textbook_path: impl Into<PathBuf>) -> Self {
        Self {
            textbook_path: textbook_path.into(),
            collection: None,
            mode: ImportMode::default(),
            dry_run: false,
        }
    }
}

/// Why a Book did not make it into the store
#[derive(Debug, Error)]
pub enum BookFailure {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Outcome for one Book
#[derive(Debug)]
pub struct BookReport {
    pub book_id: NodeId,
    pub title: String,
    pub nodes: usize,
    pub edges: usize,
    pub assembly: AssemblyStats,
    /// `None` for dry runs and failed Books
    pub import: Option<ImportReport>,
    pub failure: Option<BookFailure>,
}

/// Aggregated outcome of one run
#[derive(Debug, Default)]
pub struct IngestReport {
    pub books: Vec<BookReport>,
    pub malformed: Vec<MalformedSourceError>,
    /// Mentions skipped because the knowledge base could not answer
    pub unavailable_mentions: usize,
    pub resolver: ResolverStats,
    pub cache: CacheStats,
    pub cancelled: bool,
    pub cache_flush_error: Option<String>,
}

impl IngestReport {
    /// True when every source parsed, every mention resolved and every Book imported
    pub fn is_success(&self) -> bool {
        self.malformed.is_empty()
            && self.unavailable_mentions == 0
            && !self.cancelled
            && self.cache_flush_error.is_none()
            && self.books.iter().all(|b| b.failure.is_none())
    }

    pub fn failed_books(&self) -> impl Iterator<Item = &BookReport> {
        self.books.iter().filter(|b| b.failure.is_some())
    }
}

/// Drives one ingestion run against a store and a knowledge base.
pub struct IngestPipeline {
    parser: TextbookParser,
    extractor: Arc<dyn ConceptExtractor>,
    resolver: Arc<ConceptResolver>,
    store: Arc<dyn GraphStore>,
    workers: usize,
    batch_size: usize,
    cancel: CancellationToken,
}

impl IngestPipeline {
    pub fn new(
        parser: TextbookParser,
        extractor: Arc<dyn ConceptExtractor>,
        resolver: Arc<ConceptResolver>,
        store: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            parser,
            extractor,
            resolver,
            store,
            workers: 4,
            batch_size: 500,
            cancel: CancellationToken::new(),
        }
    }

    /// Build a pipeline from settings; opens the cache file at `cache_path`.
    pub fn from_config(
        config: &IngestConfig,
        store: Arc<dyn GraphStore>,
        kb: Arc<dyn KnowledgeBase>,
    ) -> Result<Self, ConfigError> {
        let cache = Arc::new(ConceptCache::open(&config.cache_path, config.cache_policy()));
        let resolver = ConceptResolver::new(kb, cache)
            .with_timeout(config.kb_timeout())
            .with_retry(config.retry);
        Ok(Self::new(
            TextbookParser::new(config.build_segmenter()),
            config.build_extractor()?,
            Arc::new(resolver),
            store,
        )
        .with_workers(config.workers)
        .with_batch_size(config.batch_size))
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn resolver(&self) -> &Arc<ConceptResolver> {
        &self.resolver
    }

    pub async fn run(&self, request: &IngestRequest) -> Result<IngestReport, PipelineError> {
        if !request.dry_run && !self.store.schema_ready()? {
            return Err(StorageError::SchemaMissing.into());
        }

        let parser = self.parser.clone();
        let root = request.textbook_path.clone();
        let only = request.collection.clone();
        let outcome =
            tokio::task::spawn_blocking(move || parser.parse_textbook(&root, only.as_deref())).await??;

        let mut report = IngestReport {
            malformed: outcome.errors,
            ..IngestReport::default()
        };
        for error in &report.malformed {
            warn!("skipped {}", error);
        }

        for tree in outcome.books {
            if self.cancel.is_cancelled() {
                warn!("run cancelled before {}", tree.book_id());
                report.cancelled = true;
                break;
            }
            let Some(book) = self.ingest_book(tree, request).await? else {
                report.cancelled = true;
                break;
            };
            report.unavailable_mentions += book.assembly.unavailable_mentions;
            if matches!(book.failure, Some(BookFailure::Import(ImportError::Cancelled { .. }))) {
                report.cancelled = true;
                report.books.push(book);
                break;
            }
            report.books.push(book);
        }

        let cache = Arc::clone(self.resolver.cache());
        if let Err(e) = tokio::task::spawn_blocking(move || cache.flush()).await? {
            warn!("cannot write concept cache: {}", e);
            report.cache_flush_error = Some(e.to_string());
        }
        report.resolver = self.resolver.stats();
        report.cache = self.resolver.cache().stats();

        info!(
            "run finished: {} books, {} malformed sources, {} unavailable mentions",
            report.books.len(),
            report.malformed.len(),
            report.unavailable_mentions
        );
        Ok(report)
    }

    /// `None` when cancelled before anything of the Book was written.
    async fn ingest_book(&self, tree: BookTree, request: &IngestRequest) -> Result<Option<BookReport>, PipelineError> {
        let mentions: Vec<ConceptMention> = tree
            .sentences()
            .into_iter()
            .flat_map(|sentence| extract_mentions(self.extractor.as_ref(), sentence))
            .collect();
        let keys: BTreeSet<String> = mentions.iter().map(ConceptMention::key).collect();
        info!(
            "{}: {} sentences, {} mentions, {} distinct forms",
            tree.book_id(),
            tree.sentences().len(),
            mentions.len(),
            keys.len()
        );

        // answers already cached survive; in-flight lookups are aborted
        let resolutions = tokio::select! {
            resolved = self.resolver.resolve_all(keys, self.workers) => resolved?,
            _ = self.cancel.cancelled() => {
                warn!("{}: cancelled while resolving concepts", tree.book_id());
                return Ok(None);
            }
        };

        let mut book = BookReport {
            book_id: tree.book_id().clone(),
            title: tree.title().to_string(),
            nodes: 0,
            edges: 0,
            assembly: AssemblyStats::default(),
            import: None,
            failure: None,
        };

        let graph = match GraphAssembler::new(self.resolver.knowledge_base()).assemble(&tree, &mentions, &resolutions) {
            Ok(graph) => graph,
            Err(e) => {
                warn!("cannot assemble {}: {}", book.book_id, e);
                book.failure = Some(e.into());
                return Ok(Some(book));
            }
        };
        book.nodes = graph.node_count();
        book.edges = graph.edge_count();
        book.assembly = graph.stats;

        if request.dry_run {
            info!("{}: dry run, {} nodes and {} edges not written", book.book_id, book.nodes, book.edges);
            return Ok(Some(book));
        }

        let importer = BulkImporter::new(Arc::clone(&self.store))
            .with_batch_size(self.batch_size)
            .with_cancellation(self.cancel.clone());
        let mode = request.mode;
        match tokio::task::spawn_blocking(move || importer.import(&graph, mode)).await? {
            Ok(imported) => book.import = Some(imported),
            Err(e) => {
                warn!("import of {} failed: {}", book.book_id, e);
                book.failure = Some(e.into());
            }
        }
        Ok(Some(book))
    }
}
