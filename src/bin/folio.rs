//! Folio CLI: textbook ingestion into a sentence-level knowledge graph.
//!
//! Usage:
//!   folio setup-schema [--db path]
//!   folio load --textbook-path P [--collection NAME] [--mode incremental|cleanup] [--dry-run]
//!   folio cleanup --book ID
//!   folio list-collections --textbook-path P
//!   folio stats | prune-concepts | cache-stats | verify --book ID

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use folio::import::verify_book;
use folio::parse::{collection_name, list_collections};
use folio::resolve::ConceptCache;
use folio::{
    BulkImporter, CancellationToken, GraphStore, ImportMode, IngestConfig, IngestPipeline, IngestReport,
    IngestRequest, NodeId, OpenStore, SqliteStore, WikidataClient,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "folio",
    version,
    about = "Textbook ingestion into a sentence-level knowledge graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// YAML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to the concept cache file
    #[arg(long, global = true)]
    cache: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the graph tables and indexes (idempotent)
    SetupSchema,
    /// Parse, resolve and import a textbook directory
    Load {
        /// Directory holding collections/ and modules/
        #[arg(long)]
        textbook_path: PathBuf,
        /// Only load this collection
        #[arg(long)]
        collection: Option<String>,
        /// incremental (upsert) or cleanup (delete the Book first)
        #[arg(long, default_value = "incremental")]
        mode: ImportMode,
        /// Create the schema before loading
        #[arg(long)]
        setup_schema: bool,
        /// Resolve and assemble without writing to the store
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete a Book and everything under it; Concepts are kept
    Cleanup {
        #[arg(long)]
        book: String,
    },
    /// List the collections of a textbook directory
    ListCollections {
        #[arg(long)]
        textbook_path: PathBuf,
    },
    /// Node and edge counts of the store
    Stats,
    /// Delete Concepts no Sentence links to
    PruneConcepts,
    /// Summary of the concept cache file
    CacheStats,
    /// Check that every node of a Book has exactly one parent edge pair
    Verify {
        #[arg(long)]
        book: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("folio=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Settings from `--config` (or defaults) with path flags applied.
fn settings(cli: &Cli) -> Result<IngestConfig> {
    let mut config = match &cli.config {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(cache) = &cli.cache {
        config.cache_path = cache.clone();
    }
    Ok(config)
}

fn open_store(path: &Path) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn cmd_setup_schema(config: &IngestConfig) -> Result<i32> {
    let store = open_store(&config.db_path)?;
    store.setup_schema()?;
    println!("Schema ready at {}", config.db_path.display());
    Ok(0)
}

async fn cmd_load(config: &IngestConfig, request: IngestRequest, setup_schema: bool) -> Result<i32> {
    let store = open_store(&config.db_path)?;
    if setup_schema {
        store.setup_schema()?;
    }
    let kb = WikidataClient::new(config.wikidata_settings()).context("Failed to create Wikidata client")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next level boundary");
            on_interrupt.cancel();
        }
    });

    let pipeline = IngestPipeline::from_config(config, store, Arc::new(kb))?.with_cancellation(cancel);
    let report = pipeline.run(&request).await?;
    print_report(&report, request.dry_run);
    Ok(if report.is_success() { 0 } else { 1 })
}

fn print_report(report: &IngestReport, dry_run: bool) {
    for book in &report.books {
        let a = &book.assembly;
        println!(
            "{} ({}): {} nodes, {} edges, {} concepts from {} mentions",
            book.book_id, book.title, book.nodes, book.edges, a.concepts, a.mentions
        );
        if let Some(import) = &book.import {
            println!(
                "  created {} nodes, updated {}, created {} edges ({} already present)",
                import.nodes_created, import.nodes_updated, import.edges_created, import.edges_existing
            );
        } else if dry_run && book.failure.is_none() {
            println!("  dry run: nothing written");
        }
        if let Some(failure) = &book.failure {
            println!("  FAILED: {}", failure);
        }
    }

    let r = &report.resolver;
    println!(
        "Resolution: {} cache hits, {} external calls ({} retries), {} resolved, {} not found, {} unavailable",
        r.cache_hits, r.external_calls, r.retries, r.resolved, r.not_found, r.unavailable
    );
    println!("Cache: {} entries ({} negative)", report.cache.entries, report.cache.negative);

    if !report.malformed.is_empty() {
        eprintln!("Skipped {} malformed source(s):", report.malformed.len());
        for error in &report.malformed {
            eprintln!("  {}", error);
        }
    }
    if report.unavailable_mentions > 0 {
        eprintln!("{} mention(s) skipped: knowledge base unavailable", report.unavailable_mentions);
    }
    if report.cancelled {
        eprintln!("Run cancelled; re-run to complete");
    }
    if let Some(error) = &report.cache_flush_error {
        eprintln!("Concept cache not saved: {}", error);
    }
}

fn cmd_cleanup(config: &IngestConfig, book: &str) -> Result<i32> {
    let store = open_store(&config.db_path)?;
    let book_id = NodeId::from(book);
    if store.load_node(&book_id)?.is_none() {
        eprintln!("Error: book '{}' not found", book);
        return Ok(1);
    }
    let deleted = BulkImporter::new(store).cleanup(&book_id)?;
    println!("Removed {} nodes and {} edges of '{}'", deleted.nodes, deleted.edges, book);
    Ok(0)
}

fn cmd_list_collections(textbook_path: &Path) -> Result<i32> {
    let files = list_collections(textbook_path)?;
    if files.is_empty() {
        println!("No collections found.");
        return Ok(0);
    }
    for file in files {
        println!("{}", collection_name(&file));
    }
    Ok(0)
}

fn cmd_stats(config: &IngestConfig) -> Result<i32> {
    let store = open_store(&config.db_path)?;
    if !store.schema_ready()? {
        eprintln!("Error: schema not set up; run setup-schema first");
        return Ok(1);
    }
    let books = store.list_books()?;
    println!("Books ({}):", books.len());
    for book in &books {
        println!("  {} ({})", book.id, book.title);
    }
    println!("Nodes:");
    for (kind, count) in store.node_counts()? {
        println!("  {:<12} {}", kind.as_str(), count);
    }
    println!("Edges:");
    for (label, count) in store.edge_counts()? {
        println!("  {:<34} {}", label, count);
    }
    Ok(0)
}

fn cmd_prune_concepts(config: &IngestConfig) -> Result<i32> {
    let store = open_store(&config.db_path)?;
    let removed = store.prune_orphan_concepts()?;
    println!("Removed {} orphaned concept(s)", removed);
    Ok(0)
}

fn cmd_cache_stats(config: &IngestConfig) -> Result<i32> {
    let path = &config.cache_path;
    match ConceptCache::load(path) {
        Ok(None) => {
            println!("No cache file at {}", path.display());
            return Ok(0);
        }
        Err(e) => {
            eprintln!("Error: cache file {} is unusable: {}", path.display(), e);
            return Ok(1);
        }
        Ok(Some(_)) => {}
    }
    let stats = ConceptCache::open(path, config.cache_policy()).stats();
    println!("{}", path.display());
    println!("  entries:  {}", stats.entries);
    println!("  positive: {}", stats.positive);
    println!("  negative: {}", stats.negative);
    println!("  expired:  {}", stats.expired);
    Ok(0)
}

fn cmd_verify(config: &IngestConfig, book: &str) -> Result<i32> {
    let store = open_store(&config.db_path)?;
    let book_id = NodeId::from(book);
    if store.load_node(&book_id)?.is_none() {
        eprintln!("Error: book '{}' not found", book);
        return Ok(1);
    }
    let defects = verify_book(store.as_ref(), &book_id)?;
    if defects.is_empty() {
        println!("'{}': hierarchy complete", book);
        return Ok(0);
    }
    for defect in &defects {
        println!("{}", defect);
    }
    eprintln!("'{}': {} defect(s)", book, defects.len());
    Ok(1)
}

async fn run(cli: Cli) -> Result<i32> {
    if let Commands::ListCollections { textbook_path } = &cli.command {
        return cmd_list_collections(textbook_path);
    }
    let config = settings(&cli)?;
    match cli.command {
        Commands::SetupSchema => cmd_setup_schema(&config),
        Commands::Load {
            textbook_path,
            collection,
            mode,
            setup_schema,
            dry_run,
        } => {
            let request = IngestRequest {
                textbook_path,
                collection,
                mode,
                dry_run,
            };
            cmd_load(&config, request, setup_schema).await
        }
        Commands::Cleanup { book } => cmd_cleanup(&config, &book),
        Commands::ListCollections { .. } => Ok(0),
        Commands::Stats => cmd_stats(&config),
        Commands::PruneConcepts => cmd_prune_concepts(&config),
        Commands::CacheStats => cmd_cache_stats(&config),
        Commands::Verify { book } => cmd_verify(&config, &book),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
