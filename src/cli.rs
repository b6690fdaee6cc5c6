//! Thin CLI over the evaluation engine.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::models::RunConfig;
use crate::infrastructure::cache::build_cache;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::dataset::JsonlDataset;
use crate::infrastructure::providers::build_providers;
use crate::infrastructure::sink::build_sink;
use crate::infrastructure::logging;
use crate::services::{EvalScheduler, RunSummary};

#[derive(Parser)]
#[command(
    name = "quorum",
    about = "LLM judge-ensemble orchestrator",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute an evaluation run
    Run(RunArgs),

    /// Validate configuration without executing anything
    Validate(ValidateArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Config file (defaults to hierarchical .quorum/ loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dataset JSONL path (overrides the configured path)
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Resume a crashed or cancelled run by its run id
    #[arg(long)]
    pub resume: Option<String>,

    /// Evaluate at most this many samples
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file (defaults to hierarchical .quorum/ loading)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn load_config(path: Option<&std::path::Path>) -> Result<RunConfig> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Execute `quorum run`.
pub async fn run(args: RunArgs, json: bool) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dataset) = &args.dataset {
        config.dataset.path = dataset.display().to_string();
    }
    if let Some(limit) = args.limit {
        config.dataset.limit = Some(limit);
    }

    logging::init(&config.logging);

    let dataset = Arc::new(JsonlDataset::new(&config.dataset.path));
    let providers = build_providers(&config)?;
    let cache = build_cache(&config.cache)
        .await
        .context("failed to open judgement cache")?;
    let sink = build_sink(&config.sink)
        .await
        .context("failed to open output sink")?;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let scheduler =
        EvalScheduler::new(config, providers, cache, sink)?.with_progress(progress_tx);

    // Ctrl-c cancels cooperatively: no new work units, in-flight calls drain.
    let cancel = scheduler.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let bar_task = tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40} {pos}/{len} chunks ({msg} samples)")
        {
            bar.set_style(style);
        }
        while let Some(event) = progress_rx.recv().await {
            bar.set_length(event.total_chunks as u64);
            bar.set_position(event.completed_chunks as u64);
            bar.set_message(event.completed_samples.to_string());
        }
        bar.finish_and_clear();
    });

    let summary = scheduler.run(dataset, args.resume.as_deref()).await?;
    bar_task.abort();

    print_summary(&summary, json)?;
    Ok(())
}

/// Execute `quorum validate`.
pub fn validate(args: &ValidateArgs, json: bool) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "valid": true,
                "models": config.models.len(),
                "chunk_size": config.chunk_size,
                "cache_backend": config.cache.backend,
                "sink_backend": config.sink.backend,
            })
        );
    } else {
        println!(
            "configuration valid: {} model(s), chunk_size {}, cache '{}', sink '{}'",
            config.models.len(),
            config.chunk_size,
            config.cache.backend,
            config.sink.backend
        );
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        let mut value = serde_json::to_value(summary)?;
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "gold_agreement_pct".to_string(),
                serde_json::json!(summary.gold_agreement_pct()),
            );
        }
        println!("{value}");
        return Ok(());
    }

    let status = if summary.cancelled {
        "cancelled (resumable)"
    } else {
        "finished"
    };
    println!("run {} {status}", summary.run_id);
    println!(
        "  samples: {} | judgements: {} | cache hits: {} | early exits: {}",
        summary.samples, summary.judgements, summary.cache_hits, summary.early_exits
    );
    println!(
        "  provider failures: {} | parse fallbacks: {} | abstentions: {} | chunks skipped: {}",
        summary.provider_failures,
        summary.parse_fallbacks,
        summary.abstentions,
        summary.chunks_skipped
    );
    if let Some(agreement) = summary.gold_agreement_pct() {
        println!(
            "  gold agreement: {agreement:.2}% ({}/{})",
            summary.gold_matches, summary.gold_total
        );
    }
    Ok(())
}
