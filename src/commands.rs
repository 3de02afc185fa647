use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, show_config};
use crate::database::{QdrantStore, VectorStore};
use crate::embeddings::{Cl100kTokenizer, Embedder, OpenAiEmbedder};
use crate::indexer::{Indexer, IndexerConfig, ProcessingState, RunReport, state};
use crate::search::{SearchEngine, SearchRequest};

/// Overrides for a `process` run
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub version: Option<String>,
    pub source_dir: Option<PathBuf>,
    /// Delete the state and error files first
    pub reset: bool,
}

fn open_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder =
        OpenAiEmbedder::new(&config.embedding).context("Failed to create embedding client")?;
    Ok(Arc::new(embedder))
}

fn open_store(config: &Config) -> Result<Arc<QdrantStore>> {
    let store = QdrantStore::new(&config.qdrant).context("Failed to create Qdrant client")?;
    Ok(Arc::new(store))
}

fn open_search_engine(config: &Config) -> Result<SearchEngine> {
    Ok(SearchEngine::new(
        open_embedder(config)?,
        open_store(config)?,
        config.qdrant.collection.clone(),
    ))
}

/// Run the ingestion pipeline over the configured source directory
#[inline]
pub async fn process_docs(config: &Config, options: ProcessOptions) -> Result<RunReport> {
    let mut indexer_config = IndexerConfig::from_config(config);
    if let Some(version) = options.version {
        indexer_config.version = version;
    }
    if let Some(source_dir) = options.source_dir {
        indexer_config.source_dir = source_dir;
    }

    anyhow::ensure!(
        indexer_config.source_dir.is_dir(),
        "Source directory not found: {}",
        indexer_config.source_dir.display()
    );

    if options.reset {
        state::reset(&indexer_config.state_file, &indexer_config.error_file)
            .context("Failed to reset processing state")?;
        println!("🧹 Processing state reset");
    }

    println!("📚 Processing Flame documentation");
    println!("   Source:     {}", indexer_config.source_dir.display());
    println!("   Version:    {}", indexer_config.version);
    println!("   Collection: {}", indexer_config.collection);
    println!();

    let embedder = open_embedder(config)?;
    let store: Arc<dyn VectorStore> = open_store(config)?;
    let tokenizer = Arc::new(Cl100kTokenizer::new()?);
    let indexer = Indexer::new(embedder, store, tokenizer, indexer_config);

    let report = tokio::task::spawn_blocking(move || -> Result<RunReport> {
        let mut processing_state = ProcessingState::load(&indexer.config().state_file)?;
        Ok(indexer.run(&mut processing_state)?)
    })
    .await
    .context("Processing task failed")??;

    println!();
    println!("✅ Processing complete");
    println!("   Files found:      {}", report.files_found);
    println!("   Processed now:    {}", report.successful);
    println!("   Failed:           {}", report.failed);
    println!("   Chunks created:   {}", report.chunks_created);
    if !report.errors.is_empty() {
        println!(
            "   ⚠️  Errors written to {}",
            config.pipeline.error_file.display()
        );
    }

    Ok(report)
}

/// Start the MCP server on stdio
#[inline]
pub async fn serve_mcp(config: &Config) -> Result<()> {
    let engine = Arc::new(open_search_engine(config)?);

    let collection = engine.collection().to_string();
    let store = open_store(config)?;
    let probe = tokio::task::spawn_blocking(move || store.try_get_collection(&collection))
        .await
        .context("Collection check failed")?;
    match probe {
        Ok(Some(info)) => info!(
            "Collection '{}' ready ({} points)",
            info.name,
            info.points_count.unwrap_or_default()
        ),
        Ok(None) => warn!(
            "Collection '{}' not found; run `flame-docs-mcp process` first",
            engine.collection()
        ),
        Err(e) => warn!("Could not reach Qdrant: {}", e),
    }

    let server = crate::mcp::build_server(engine).await;
    info!("MCP server initialized with tool: get_flame_knowledge");

    // stdout carries the protocol, so only logs go to stderr from here on
    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}

/// Run one search and print the records as JSON
#[inline]
pub async fn search_docs(config: &Config, request: SearchRequest) -> Result<()> {
    let engine = open_search_engine(config)?;
    let hits = tokio::task::spawn_blocking(move || engine.search(&request))
        .await
        .context("Search task failed")??;

    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

/// Verify credentials and Qdrant reachability before serving
#[inline]
pub async fn check_setup(config: &Config) -> Result<()> {
    println!("🚀 Flame Docs MCP Setup Check");
    println!("{}", "=".repeat(40));

    let mut healthy = true;

    if config.embedding.has_credentials() {
        println!("✅ Embedding credentials configured");
        println!(
            "   {} ({})",
            config.embedding.endpoint, config.embedding.model
        );
    } else {
        healthy = false;
        println!("❌ Missing embedding credentials:");
        if config.embedding.api_key.trim().is_empty() {
            println!("   - OPENAI_API_KEY");
        }
        if config.embedding.endpoint.trim().is_empty() {
            println!("   - OPENAI_API_BASE");
        }
    }

    println!("🔍 Testing Qdrant connection...");
    let store = open_store(config)?;
    let collection = config.qdrant.collection.clone();
    let probe = tokio::task::spawn_blocking(move || {
        store.health_check()?;
        store.try_get_collection(&collection)
    })
    .await
    .context("Qdrant check failed")?;

    match probe {
        Ok(Some(info)) => {
            println!(
                "✅ Connected to Qdrant - Collection '{}' found",
                config.qdrant.collection
            );
            match info.points_count {
                Some(points) => println!("   Vectors: {}", points),
                None => println!("   Vectors: unknown"),
            }
        }
        Ok(None) => println!(
            "⚠️  Collection '{}' not found - you may need to run the processing pipeline first",
            config.qdrant.collection
        ),
        Err(e) => {
            healthy = false;
            println!("❌ Failed to connect to Qdrant: {}", e);
            println!("   Please ensure Qdrant is running at {}", config.qdrant.url);
        }
    }

    if !healthy {
        anyhow::bail!("Setup check failed");
    }
    println!();
    println!("💡 Use 'flame-docs-mcp serve' to start the MCP server");
    Ok(())
}

/// Print the effective configuration, or write it out
#[inline]
pub fn configure(config: &Config, init: bool) -> Result<()> {
    if init {
        config.save()?;
        println!("✅ Configuration written to {}", config.config_path.display());
        return Ok(());
    }
    show_config(config);
    Ok(())
}

/// Print the persisted processing state and error count
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    let state_file = &config.pipeline.state_file;
    let error_file = &config.pipeline.error_file;

    let processing_state = ProcessingState::load(state_file)?;
    let errors = state::load_errors(error_file)?;

    println!("📊 Flame Docs MCP Status Report");
    println!("{}", "=".repeat(40));
    println!("   State file:      {}", state_file.display());
    println!(
        "   Files processed: {}",
        processing_state.processed_files.len()
    );
    println!("   Chunks created:  {}", processing_state.chunks_created);
    println!(
        "   Last updated:    {}",
        processing_state.last_updated.format("%Y-%m-%d %H:%M:%S")
    );
    if errors.is_empty() {
        println!("   Errors:          none");
    } else {
        println!(
            "   Errors:          {} (see {})",
            errors.len(),
            error_file.display()
        );
    }

    Ok(())
}
