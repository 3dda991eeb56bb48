use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use chorus::api;
use chorus::config::{configured_categories, BatchKey, StorageLayout, Thresholds};
use chorus::dedup::{run_dedup, DedupRequest};
use chorus::embedding::EmbeddingOracle;
use chorus::logging::configure_logging;
use chorus::similarity::{SimilarityOracle, TfIdfOracle};
use chorus::TARGET_DEDUP;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// Lexical TF-IDF + cosine similarity.
    Tfidf,
    /// E5 embedding cosine similarity (downloads model weights on first use).
    Embedding,
}

#[derive(Parser)]
#[command(name = "chorus", about = "News batch deduplication service")]
struct Cli {
    /// Similarity backend used for both titles and contents.
    #[arg(long, value_enum, default_value = "tfidf", global = true)]
    backend: Backend,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server.
    Serve,
    /// Deduplicate one (category, period, date) batch.
    Run {
        #[arg(long)]
        category: String,
        #[arg(long)]
        period: String,
        /// Defaults to today (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value_t = Thresholds::default().title)]
        title_threshold: f64,
        #[arg(long, default_value_t = Thresholds::default().content)]
        content_threshold: f64,
        #[arg(long, default_value_t = Thresholds::default().related_min)]
        related_min_threshold: f64,
    },
    /// Deduplicate every configured category for one period and date.
    Batch {
        #[arg(long)]
        period: String,
        #[arg(long)]
        date: Option<String>,
    },
}

async fn build_oracle(backend: Backend) -> Result<Arc<dyn SimilarityOracle>> {
    match backend {
        Backend::Tfidf => Ok(Arc::new(TfIdfOracle)),
        Backend::Embedding => Ok(Arc::new(EmbeddingOracle::prepare().await?)),
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            error!("Failed to listen for ctrl-c");
        }
        let _ = cancel_tx.send(true);
    });

    let layout = StorageLayout::from_env();
    let oracle = build_oracle(cli.backend).await?;

    match cli.command {
        Command::Serve => api::serve(oracle, layout, cancel_rx).await,
        Command::Run {
            category,
            period,
            date,
            title_threshold,
            content_threshold,
            related_min_threshold,
        } => {
            let request = DedupRequest {
                key: BatchKey {
                    category,
                    period,
                    date: date.unwrap_or_else(today),
                },
                thresholds: Thresholds {
                    title: title_threshold,
                    content: content_threshold,
                    related_min: related_min_threshold,
                },
            };
            let summary = tokio::task::spawn_blocking(move || {
                run_dedup(&request, &layout, oracle.as_ref(), &cancel_rx)
            })
            .await??;
            info!(
                target: TARGET_DEDUP,
                "{} -> {} articles kept, {} related edges",
                summary.total_count,
                summary.deduplicated_count,
                summary.related_count
            );
            Ok(())
        }
        Command::Batch { period, date } => {
            let date = date.unwrap_or_else(today);
            run_batch(&period, &date, layout, oracle, cancel_rx).await
        }
    }
}

/// Processes every configured category for one period/date in sequence.
/// One category's failure is logged and does not stop the rest.
async fn run_batch(
    period: &str,
    date: &str,
    layout: StorageLayout,
    oracle: Arc<dyn SimilarityOracle>,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    let categories = configured_categories();
    if categories.is_empty() {
        anyhow::bail!("CATEGORIES environment variable is not set");
    }

    let started = Instant::now();
    let mut succeeded = 0usize;
    let mut failed: Vec<String> = Vec::new();

    for (position, category) in categories.iter().enumerate() {
        if *cancel.borrow() {
            info!(target: TARGET_DEDUP, "batch cancelled after {} categories", position);
            break;
        }

        info!(
            target: TARGET_DEDUP,
            "[{}/{}] processing category {}",
            position + 1,
            categories.len(),
            category
        );

        let request = DedupRequest {
            key: BatchKey {
                category: category.clone(),
                period: period.to_string(),
                date: date.to_string(),
            },
            thresholds: Thresholds::default(),
        };
        let layout = layout.clone();
        let oracle = oracle.clone();
        let cancel = cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            run_dedup(&request, &layout, oracle.as_ref(), &cancel)
        })
        .await?;

        match outcome {
            Ok(summary) => {
                succeeded += 1;
                info!(
                    target: TARGET_DEDUP,
                    "{} done: {} -> {} kept, {} related",
                    category,
                    summary.total_count,
                    summary.deduplicated_count,
                    summary.related_count
                );
            }
            Err(err) => {
                error!(target: TARGET_DEDUP, "{} failed: {}", category, err);
                failed.push(category.clone());
            }
        }
    }

    info!(
        target: TARGET_DEDUP,
        "batch complete: {}/{} categories succeeded in {:.2}s",
        succeeded,
        categories.len(),
        started.elapsed().as_secs_f64()
    );
    if !failed.is_empty() {
        info!(target: TARGET_DEDUP, "failed categories: {}", failed.join(", "));
    }
    Ok(())
}
