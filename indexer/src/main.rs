use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ftsearch_core::{Bm25Params, IndexConfig, IndexWriter, IndexingRun, Language, QueryEngine, QueryOptions, SegmentReader};
use tracing_subscriber::{fmt, EnvFilter};

use std::path::{Path, PathBuf};

mod input;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query BM25 inverted indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a new index generation from JSON/JSONL files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output index directory; the previous generation there is replaced
        #[arg(long, default_value = "./outputs/indexes/ft.index")]
        output: PathBuf,
        /// Analyzer language
        #[arg(long, default_value_t = Language::English)]
        language: Language,
        /// BM25 term frequency saturation
        #[arg(long, default_value_t = 1.2)]
        k1: f32,
        /// BM25 length normalization
        #[arg(long, default_value_t = 0.75)]
        b: f32,
    },
    /// Run a query against a published index
    Search {
        /// Index directory
        #[arg(long, default_value = "./outputs/indexes/ft.index")]
        index: PathBuf,
        /// Query text; `field:word` restricts a word to one field
        #[arg(long)]
        query: String,
        /// Number of results to print
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Field weight as `field=weight`, repeatable
        #[arg(long = "weight", value_parser = parse_weight)]
        weights: Vec<(String, f32)>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, language, k1, b } => {
            build_index(&input, &output, IndexConfig::new(language, Bm25Params { k1, b })).map(|_| ())
        }
        Commands::Search { index, query, top_k, weights } => search(&index, &query, top_k, weights),
    }
}

fn build_index(input: &Path, output: &Path, config: IndexConfig) -> Result<u64> {
    let files = input::collect_input_files(input)?;
    if files.is_empty() {
        anyhow::bail!("no .json or .jsonl files under {}", input.display());
    }

    let mut run = IndexingRun::new(config)?;
    for file in &files {
        let docs = input::read_documents(file)?;
        let count = docs.len();
        run.add_documents(docs).with_context(|| format!("indexing {}", file.display()))?;
        tracing::info!(file = %file.display(), docs = count, "read input file");
    }

    let segment = run.finish()?;
    tracing::info!(num_docs = segment.num_docs(), num_terms = segment.num_terms(), "ingested documents");
    let generation = IndexWriter::new(output)
        .write(&segment)
        .with_context(|| format!("writing index to {}", output.display()))?;
    tracing::info!(output = %output.display(), generation, "index build complete");
    Ok(generation)
}

fn search(index: &Path, query: &str, top_k: usize, weights: Vec<(String, f32)>) -> Result<()> {
    let segment = SegmentReader::open(index).with_context(|| format!("opening index {}", index.display()))?;
    let mut options = QueryOptions::default().top_k(top_k);
    for (field, weight) in weights {
        options = options.field_weight(field, weight);
    }
    let results = QueryEngine::new(&segment).search(query, &options)?;
    tracing::info!(total_hits = results.total_hits(), "query finished");
    for hit in results.into_hits(&segment)? {
        println!("{}", serde_json::to_string(&hit)?);
    }
    Ok(())
}

fn parse_weight(s: &str) -> Result<(String, f32), String> {
    let (field, weight) = s.split_once('=').ok_or_else(|| format!("expected field=weight, got `{s}`"))?;
    let weight: f32 = weight.parse().map_err(|e| format!("bad weight in `{s}`: {e}"))?;
    Ok((field.to_string(), weight))
}
