use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use semindex_retrieval::{RetrievalConfig, SemanticSearch};

/// Answer questions with the closest chunks of a JSON corpus.
#[derive(Debug, Parser)]
#[command(name = "semindex", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON chunk bundle; overrides `corpus` from the configuration.
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Number of chunks per question; overrides `query.top_k`.
    #[arg(short)]
    k: Option<usize>,

    /// Log timer stats when done.
    #[arg(long)]
    timings: bool,

    /// Questions to answer.
    #[arg(required = true)]
    questions: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RetrievalConfig::load(path)?,
        None => RetrievalConfig::default(),
    };
    if let Some(corpus) = cli.corpus {
        config.corpus = Some(corpus);
    }
    if let Some(k) = cli.k {
        config.query.top_k = k;
    }

    let corpus = config
        .corpus
        .clone()
        .context("no corpus given; pass --corpus or set `corpus` in the configuration")?;

    let engine = SemanticSearch::new(config)?;
    let report = engine.load_corpus(&corpus).await?;
    for failed in &report.failed {
        warn!(chunk_id = %failed.id, "Skipped chunk: {}", failed.error);
    }

    for question in &cli.questions {
        let results = engine
            .ask(question, None)
            .await
            .with_context(|| format!("failed to answer {question:?}"))?;

        println!("{question}");
        for (rank, result) in results.iter().enumerate() {
            println!(
                "  {}. [{:.4}] {} ({})",
                rank + 1,
                result.distance,
                result.chunk.short_description(),
                result.chunk.original_url
            );
        }
    }

    if cli.timings {
        engine.timings().report_all();
    }

    Ok(())
}
