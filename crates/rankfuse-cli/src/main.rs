//! rankfuse CLI - run a composition tree over a JSON corpus.
//!
//! # Usage
//!
//! ```bash
//! # Search the default tree (exact title match, then a vote of BM25 per field)
//! rf "paris museums" --corpus towns.jsonl
//! rf "paris" "lyon" -k 5 --json
//!
//! # Use a saved tree and show its structure
//! rf "query" --pipeline pipeline.json --explain
//!
//! # Show help
//! rf --help
//! ```

mod config;
mod output;
mod search;

use anyhow::Result;
use clap::Parser;
use rankfuse_core::SearchOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// rankfuse multi-stage retrieval CLI.
///
/// Loads a corpus, builds a composition tree (from a pipeline file or the
/// built-in default), indexes the corpus and evaluates the queries. Several
/// queries are evaluated as one batch.
#[derive(Parser)]
#[command(name = "rf", version, about)]
struct Cli {
    /// Search queries (one result list per query)
    queries: Vec<String>,

    /// Maximum number of results per query
    #[arg(short = 'k', long = "limit", default_value = "10")]
    limit: usize,

    /// Number of queries handed to each stage per call
    #[arg(long)]
    batch_size: Option<usize>,

    /// Serialized tree (default: pipeline.json in the data directory, then the built-in tree)
    #[arg(long, env = "RANKFUSE_PIPELINE")]
    pipeline: Option<PathBuf>,

    /// Corpus as a JSON array or JSON Lines (default: corpus file in the data directory)
    #[arg(long, env = "RANKFUSE_CORPUS")]
    corpus: Option<PathBuf>,

    /// Key field of the built-in tree
    #[arg(long, default_value = "id")]
    key: String,

    /// Indexed fields of the built-in tree (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "title,text")]
    on: Vec<String>,

    /// Custom data directory (default: platform standard location)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Print the composition tree before searching
    #[arg(long)]
    explain: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.queries.is_empty() && !cli.explain {
        eprintln!("No search query provided. Use --help for usage information.");
        std::process::exit(1);
    }

    let data_dir = config::get_data_dir(cli.data_dir.as_ref())?;
    let pipeline = config::resolve_pipeline(cli.pipeline.as_ref(), &data_dir);
    let mut tree = search::load_tree(pipeline.as_deref(), &cli.key, &cli.on)?;

    if cli.explain {
        eprintln!("{}", tree);
        if cli.queries.is_empty() {
            return Ok(());
        }
    }

    let corpus = config::resolve_corpus(cli.corpus.as_ref(), &data_dir)?;
    let documents = search::load_corpus(&corpus)?;
    tree.add(&documents).await?;

    let mut options = SearchOptions::with_k(cli.limit);
    options.batch_size = cli.batch_size;
    let results = search::execute_search(&tree, &cli.queries, &options).await?;

    let output = if cli.json {
        output::format_json(&cli.queries, &results)
    } else {
        output::format_human(&cli.queries, &results, &cli.on)
    };
    println!("{}", output);

    Ok(())
}
