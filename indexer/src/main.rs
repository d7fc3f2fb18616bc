use anyhow::{Context, Result};
use bsbi::persist::{load_meta, IndexPaths};
use bsbi::{AnalyzerConfig, BsbiConfig, BsbiIndex, PostingsEncoding, Searcher};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a blocked sort-based boolean inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a collection directory; every sub-directory is one block
    Build {
        /// Collection root
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// Postings encoding: standard, vbe or elias-gamma
        #[arg(long, default_value = "vbe")]
        encoding: PostingsEncoding,
        /// Base name of the final index files
        #[arg(long, default_value = "main_index")]
        index_name: String,
        /// Snowball stemmer language, or "none" to index words as they are
        #[arg(long, default_value = "english")]
        language: String,
        /// File with one stopword per line, replacing the built-in English list
        #[arg(long)]
        stopwords: Option<PathBuf>,
        /// Keep every word, including stopwords
        #[arg(long, default_value_t = false)]
        no_stopwords: bool,
        /// Keep the per-block indices after merging
        #[arg(long, default_value_t = false)]
        keep_intermediate: bool,
    },
    /// Run boolean queries (AND, OR, DIFF, parentheses) against a built index
    Search {
        /// Index directory
        #[arg(long)]
        index: PathBuf,
        /// Postings encoding, when it should not be taken from meta.json
        #[arg(long)]
        encoding: Option<PostingsEncoding>,
        /// Print one JSON object per query
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(required = true)]
        queries: Vec<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, encoding, index_name, language, stopwords, no_stopwords, keep_intermediate } => {
            let analyzer = analyzer_config(&language, stopwords.as_deref(), no_stopwords)?;
            let mut config = BsbiConfig::new(&input, &output);
            config.encoding = encoding;
            config.index_name = index_name;
            config.analyzer = analyzer;
            config.keep_intermediate = keep_intermediate;
            build_index(config)
        }
        Commands::Search { index, encoding, json, queries } => search(&index, encoding, json, &queries),
    }
}

fn analyzer_config(language: &str, stopwords: Option<&Path>, no_stopwords: bool) -> Result<AnalyzerConfig> {
    let language = match language.to_ascii_lowercase().as_str() {
        "none" => None,
        other => Some(other.to_string()),
    };
    let stopwords = if no_stopwords {
        Vec::new()
    } else if let Some(path) = stopwords {
        read_stopwords(path)?
    } else {
        AnalyzerConfig::default().stopwords
    };
    Ok(AnalyzerConfig { language, stopwords })
}

fn read_stopwords(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading stopwords from {}", path.display()))?;
    Ok(text
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect())
}

fn build_index(config: BsbiConfig) -> Result<()> {
    let start = Instant::now();
    let input = config.data_path.clone();
    let output = config.output_path.clone();
    let mut bsbi = BsbiIndex::new(config);
    let stats = bsbi
        .start_indexing()
        .with_context(|| format!("indexing {}", input.display()))?;

    tracing::info!(output = %output.display(), elapsed_s = start.elapsed().as_secs_f64(), "elapsed indexing time");
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn search(index: &Path, encoding: Option<PostingsEncoding>, json: bool, queries: &[String]) -> Result<()> {
    let mut searcher = match encoding {
        Some(encoding) => {
            let meta = load_meta(&IndexPaths::new(index))?;
            Searcher::open_with(index, &meta.index_name, encoding, &meta.analyzer)
        }
        None => Searcher::open(index),
    }
    .with_context(|| format!("opening index at {}", index.display()))?;

    for query in queries {
        let start = Instant::now();
        let outcome = searcher.search(query)?;
        tracing::info!(query = %query, hits = outcome.documents.len(), elapsed_s = start.elapsed().as_secs_f64(), "query evaluated");

        if json {
            println!("{}", serde_json::to_string(&outcome)?);
            continue;
        }
        println!("Query  : {query}");
        if let Some(diagnostic) = &outcome.diagnostic {
            println!("Rejected: {diagnostic}");
        }
        println!("Results:");
        for doc in &outcome.documents {
            println!("{doc}");
        }
        println!();
    }
    Ok(())
}
