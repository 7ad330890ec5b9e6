use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use docdex_embed::HttpEmbeddingProvider;
use docdex_indexer::backend::HttpSearchBackend;
use docdex_indexer::config::DocdexConfig;
use docdex_indexer::extract::PlainTextExtractor;
use docdex_indexer::pipeline::VectorIndexingPipeline;
use docdex_indexer::store::{EmbeddingCache, StateStore, TrackerStore};
use docdex_query::{QueryEngine, SearchFilter, SearchMode, SearchOptions, format_results};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Index office documents into a search service and query them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (endpoints, keys, indexing knobs).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index every supported file under a directory
    Index {
        /// Directory to index
        path: PathBuf,
        /// Do not descend into subdirectories
        #[arg(long)]
        no_recursive: bool,
        /// Reprocess every file, ignoring the incremental tracker
        #[arg(long)]
        full: bool,
        /// Print run statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Index a single file
    IndexFile {
        /// File to index
        path: PathBuf,
    },
    /// Search the index
    Search {
        /// Query text
        query: String,
        /// Retrieval mode: keyword, vector, hybrid, or semantic
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,
        /// Number of results
        #[arg(short, long, default_value_t = 10)]
        top: usize,
        /// Filter by file extension (e.g. .pdf)
        #[arg(long)]
        extension: Option<String>,
        /// Filter by document author
        #[arg(long)]
        author: Option<String>,
        /// Filter by modified date lower bound (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        modified_from: Option<String>,
        /// Filter by modified date upper bound (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        modified_to: Option<String>,
        /// Extra field equality filters as field=value
        #[arg(long = "field", value_name = "FIELD=VALUE")]
        fields: Vec<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget all indexed-file records, forcing a full re-index next run
    Purge,
    /// Drop all cached embeddings
    ClearCache,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let config = DocdexConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Index {
            path,
            no_recursive,
            full,
            json,
        } => {
            let pipeline = build_pipeline(&config, full).await?;
            let stats = pipeline.index_directory(&path, !no_recursive).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
            Ok(())
        }
        Commands::IndexFile { path } => {
            let pipeline = build_pipeline(&config, false).await?;
            let uploaded = pipeline.index_file(&path).await?;
            println!("Indexed {} chunks from {}", uploaded, path.display());
            Ok(())
        }
        Commands::Search {
            query,
            mode,
            top,
            extension,
            author,
            modified_from,
            modified_to,
            fields,
            json,
        } => {
            config.validate_remote()?;
            let store = Arc::new(StateStore::open(&config.indexing.state_db).await?);
            let provider = Arc::new(HttpEmbeddingProvider::new(
                config.embed_config(),
                config.retry_policy(),
            )?);
            let backend = Arc::new(HttpSearchBackend::new(config.search_backend_config())?);
            let engine = QueryEngine::new(backend, provider, store);

            let mut filter = SearchFilter::default();
            if let Some(extension) = extension {
                filter = filter.with_extension(extension);
            }
            if let Some(author) = author {
                filter = filter.with_author(author);
            }
            if let Some(from) = modified_from {
                filter = filter.with_modified_from(parse_date(&from)?);
            }
            if let Some(to) = modified_to {
                filter = filter.with_modified_to(parse_date(&to)?);
            }
            for spec in fields {
                let (field, value) = spec
                    .split_once('=')
                    .ok_or_else(|| anyhow!("invalid field filter (expected field=value): {spec}"))?;
                filter = filter.with_field(field, value);
            }

            let mut options = SearchOptions::default().with_mode(mode).with_top_k(top);
            if !filter.is_empty() {
                options = options.with_filter(filter);
            }

            let hits = engine.search(&query, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                println!("{}", format_results(&hits, true));
            }
            Ok(())
        }
        Commands::Purge => {
            let store = StateStore::open(&config.indexing.state_db).await?;
            TrackerStore::purge(&store).await?;
            println!("Cleared all indexed-file records");
            Ok(())
        }
        Commands::ClearCache => {
            let store = StateStore::open(&config.indexing.state_db).await?;
            EmbeddingCache::clear(&store).await?;
            println!("Cleared the embedding cache");
            Ok(())
        }
    }
}

async fn build_pipeline(config: &DocdexConfig, full: bool) -> Result<VectorIndexingPipeline> {
    config.validate_remote()?;

    let mut pipeline_config = config.pipeline_config();
    if full {
        pipeline_config.incremental = false;
    }

    let provider = Arc::new(HttpEmbeddingProvider::new(
        config.embed_config(),
        config.retry_policy(),
    )?);
    let backend = Arc::new(HttpSearchBackend::new(config.search_backend_config())?);
    let store = Arc::new(
        StateStore::open(&config.indexing.state_db)
            .await
            .with_context(|| {
                format!(
                    "failed to open state database {}",
                    config.indexing.state_db.display()
                )
            })?,
    );

    VectorIndexingPipeline::new(
        pipeline_config,
        Arc::new(PlainTextExtractor),
        provider,
        store.clone(),
        store,
        backend,
    )
}

fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date: {value} (expected RFC 3339 or YYYY-MM-DD)"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date: {value}"))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

fn print_stats(stats: &docdex_indexer::pipeline::IndexingRunStats) {
    let duration = (stats.finished - stats.started).num_milliseconds() as f64 / 1000.0;
    println!("Indexing run finished in {duration:.2}s");
    println!("  Files seen: {}", stats.files_seen);
    println!("  Succeeded: {}", stats.files_succeeded);
    println!("  Skipped (unchanged): {}", stats.files_skipped);
    println!("  Failed: {}", stats.files_failed);
    println!("  Chunks created: {}", stats.chunks_created);
    println!("  Embeddings generated: {}", stats.embeddings_generated);
    println!("  Embedding API calls: {}", stats.embedding_api_calls);
    println!("  Chunk failures: {}", stats.chunk_failures);
    println!(
        "  Data processed: {:.2} MB",
        stats.bytes_processed as f64 / (1024.0 * 1024.0)
    );
}
