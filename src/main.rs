use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use flame_docs_mcp::commands::{
    ProcessOptions, check_setup, configure, process_docs, search_docs, serve_mcp, show_status,
};
use flame_docs_mcp::config::Config;
use flame_docs_mcp::search::{DEFAULT_LIMIT, DEFAULT_MIN_SCORE, SearchRequest};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flame-docs-mcp")]
#[command(about = "Index Flame engine documentation into Qdrant and search it over MCP")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and store the Markdown documentation
    Process {
        /// Documentation version recorded on every chunk
        #[arg(long)]
        version: Option<String>,
        /// Directory of Markdown files to index
        #[arg(long)]
        source: Option<PathBuf>,
        /// Forget previously processed files and start over
        #[arg(long)]
        reset: bool,
    },
    /// Start MCP server on stdio
    Serve,
    /// Search the indexed documentation and print JSON results
    Search {
        query: String,
        /// Only return chunks of this documentation version
        #[arg(long)]
        version: Option<String>,
        /// Maximum number of results
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
        /// Minimum boosted similarity score
        #[arg(long, default_value_t = DEFAULT_MIN_SCORE)]
        min_score: f64,
    },
    /// Verify credentials and the Qdrant connection
    Check,
    /// Show or write the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write the effective configuration to the config file
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
    /// Show the persisted processing state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Process {
            version,
            source,
            reset,
        } => {
            process_docs(
                &config,
                ProcessOptions {
                    version,
                    source_dir: source,
                    reset,
                },
            )
            .await?;
        }
        Commands::Serve => {
            serve_mcp(&config).await?;
        }
        Commands::Search {
            query,
            version,
            limit,
            min_score,
        } => {
            let request = SearchRequest {
                query,
                version,
                limit,
                min_score,
            };
            search_docs(&config, request).await?;
        }
        Commands::Check => {
            check_setup(&config).await?;
        }
        Commands::Config { show: _, init } => {
            configure(&config, init)?;
        }
        Commands::Status => {
            show_status(&config)?;
        }
    }

    Ok(())
}
