//! Concurrency scheduler: drives all (sample, model) work units to
//! completion under per-provider worker pools, rate limits, caching, retry,
//! and the early-exit policy.
//!
//! Concurrency layout: samples fan out as tokio tasks; within one sample the
//! models are evaluated sequentially in registry priority order (the
//! early-exit policy requires it), and every provider call first takes a
//! permit from that provider's bounded pool and a token from its rate
//! limiter. Across samples, work units in the same pool interleave freely;
//! results are correlated back by (sample, model), never by arrival order.
//!
//! Chunks are the unit of durable progress: a chunk's records are sorted and
//! handed to the sink, and its completion marked in the manifest, only after
//! every sample in it reached a completion criterion. Cancellation stops
//! dispatch of new work units immediately; in-flight provider calls drain,
//! the interrupted chunk is abandoned (the cache retains its paid provider
//! calls), and the manifest keeps it incomplete for resume.

use chrono::Utc;
use futures::future;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::domain::models::{
    flag, warning, ChunkPlan, EnsembleResult, FinalLabel, JudgeLabel, Judgement, ModelConfig,
    RunConfig, RunManifest, Sample,
};
use crate::domain::ports::cache::{CacheKey, JudgementCache};
use crate::domain::ports::dataset::{DatasetError, DatasetSource};
use crate::domain::ports::provider::{Provider, ProviderError};
use crate::domain::ports::sink::{OutputSink, SinkError};
use crate::domain::EngineError;
use crate::services::aggregator::EnsembleAggregator;
use crate::services::normalizer::{self, CallContext};
use crate::services::rate_limit::TokenBucket;
use crate::services::retry::{RetryError, RetryExecutor};
use crate::services::{chunk_planner, prompt};

/// Errors that abort a run.
///
/// Per-unit provider/cache/parse failures never appear here; they are
/// recovered into warnings and flags on the records themselves.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("no manifest found for resume run id {0}")]
    UnknownResumeRun(String),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Cooperative cancellation handle for a running evaluation.
///
/// Cancelling stops dispatch of new work units; in-flight provider calls are
/// allowed to finish or time out rather than being forcibly killed.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Progress notification emitted after each chunk is durably completed.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub completed_chunks: usize,
    pub total_chunks: usize,
    pub completed_samples: usize,
}

/// End-of-run accounting.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub samples: usize,
    pub judgements: usize,
    pub cache_hits: usize,
    pub provider_failures: usize,
    pub parse_fallbacks: usize,
    pub early_exits: usize,
    pub abstentions: usize,
    pub chunks_skipped: usize,
    pub cancelled: bool,

    /// Ensemble verdicts matching the sample's gold label, when present
    pub gold_matches: usize,
    pub gold_total: usize,
}

impl RunSummary {
    /// Agreement with gold labels as a percentage, when any were present.
    pub fn gold_agreement_pct(&self) -> Option<f64> {
        if self.gold_total == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let pct = 100.0 * self.gold_matches as f64 / self.gold_total as f64;
        Some(pct)
    }
}

/// One provider's bounded worker pool plus its pacing bucket.
struct ProviderPool {
    provider: Arc<dyn Provider>,
    workers: Arc<Semaphore>,
    limiter: TokenBucket,
}

/// State shared by all sample workers.
struct Shared {
    config: RunConfig,
    pools: HashMap<String, ProviderPool>,
    cache: Arc<dyn JudgementCache>,
    retry: RetryExecutor,
    aggregator: EnsembleAggregator,
    cancel: CancelHandle,
}

/// Outcome of one sample's evaluation.
struct SampleOutcome {
    judgements: Vec<Judgement>,
    ensemble: EnsembleResult,

    /// Whether the verdict matched the sample's gold label (None when the
    /// sample has no gold label or the ensemble abstained)
    gold_match: Option<bool>,

    /// False when cancellation interrupted the sample before its completion
    /// criterion; such samples invalidate their chunk
    complete: bool,
}

/// The evaluation scheduler.
pub struct EvalScheduler {
    shared: Arc<Shared>,
    sink: Arc<dyn OutputSink>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl EvalScheduler {
    /// Build a scheduler from configuration and collaborators.
    ///
    /// Fails with `InvalidConfig` when the model registry is empty or a
    /// registered model references a provider tag with no adapter.
    pub fn new(
        config: RunConfig,
        providers: HashMap<String, Arc<dyn Provider>>,
        cache: Arc<dyn JudgementCache>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, EngineError> {
        if config.models.is_empty() {
            return Err(EngineError::InvalidConfig(
                "model registry is empty".to_string(),
            ));
        }

        let mut pools = HashMap::new();
        for tag in config.provider_tags() {
            let provider = providers.get(&tag).cloned().ok_or_else(|| {
                EngineError::InvalidConfig(format!("no provider adapter for tag '{tag}'"))
            })?;
            pools.insert(
                tag,
                ProviderPool {
                    provider,
                    workers: Arc::new(Semaphore::new(config.scheduler.workers_per_provider)),
                    limiter: TokenBucket::new(config.scheduler.requests_per_second),
                },
            );
        }

        let aggregator =
            EnsembleAggregator::new(config.weight_map(), config.aggregation.high_disagreement_threshold);
        let retry = RetryExecutor::new(config.retry.clone());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                pools,
                cache,
                retry,
                aggregator,
                cancel: CancelHandle::default(),
            }),
            sink,
            progress: None,
        })
    }

    /// Subscribe to per-chunk progress events.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Handle for cancelling this run from another task (e.g. ctrl-c).
    pub fn cancel_handle(&self) -> CancelHandle {
        self.shared.cancel.clone()
    }

    /// Execute a full run, or resume `resume_run_id` from its manifest.
    pub async fn run(
        &self,
        dataset: Arc<dyn DatasetSource>,
        resume_run_id: Option<&str>,
    ) -> Result<RunSummary, RunError> {
        let shared = &self.shared;

        let mut samples = dataset.load().await?;
        if let Some(limit) = shared.config.dataset.limit {
            samples.truncate(limit);
        }

        let sample_ids: Vec<String> = samples.iter().map(|s| s.sample_id.clone()).collect();
        let plan = chunk_planner::plan(&sample_ids, shared.config.chunk_size)?;
        let by_id: HashMap<String, Arc<Sample>> = samples
            .into_iter()
            .map(|sample| (sample.sample_id.clone(), Arc::new(sample)))
            .collect();

        let mut manifest = match resume_run_id {
            Some(run_id) => {
                let manifest = self
                    .sink
                    .load_manifest(run_id)
                    .await?
                    .ok_or_else(|| RunError::UnknownResumeRun(run_id.to_string()))?;
                verify_resume_plan(&manifest, &plan)?;
                info!(
                    run_id,
                    completed = manifest.completed_chunks(),
                    total = plan.len(),
                    "resuming run from manifest"
                );
                manifest
            }
            None => {
                let manifest = RunManifest::new(
                    dataset.dataset_ref(),
                    shared.config.models.clone(),
                    strategy_params(&shared.config),
                    &plan,
                )
                .with_notes(shared.config.notes.clone());
                self.sink.begin_run(&manifest).await?;
                manifest
            }
        };

        info!(
            run_id = %manifest.run_id,
            samples = plan.total_samples(),
            chunks = plan.len(),
            models = shared.config.models.len(),
            "run starting"
        );

        let mut summary = RunSummary {
            run_id: manifest.run_id.clone(),
            ..RunSummary::default()
        };

        for chunk in &plan.chunks {
            if manifest.is_chunk_complete(chunk.index) {
                debug!(chunk = chunk.index, "chunk already complete, skipping");
                summary.chunks_skipped += 1;
                continue;
            }
            if shared.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let mut handles = Vec::with_capacity(chunk.len());
            for sample_id in &chunk.sample_ids {
                // Plan ids come from the dataset, so the lookup cannot miss;
                // skip defensively if a source misbehaves.
                let Some(sample) = by_id.get(sample_id) else {
                    warn!(sample_id, "sample in plan but not in dataset, skipping");
                    continue;
                };
                let shared = Arc::clone(shared);
                let sample = Arc::clone(sample);
                handles.push(tokio::spawn(async move {
                    process_sample(&shared, &sample).await
                }));
            }

            let outcomes: Vec<SampleOutcome> = future::join_all(handles)
                .await
                .into_iter()
                .collect::<Result<_, _>>()?;

            if outcomes.iter().any(|outcome| !outcome.complete) {
                // Cancellation landed mid-chunk: drop the partial chunk and
                // leave it unmarked. Completed provider calls live on in the
                // cache, so no paid work is lost on resume.
                info!(chunk = chunk.index, "chunk interrupted by cancellation, discarding");
                summary.cancelled = true;
                break;
            }

            self.commit_chunk(&mut manifest, chunk.index, outcomes, &mut summary)
                .await?;

            if let Some(progress) = &self.progress {
                let _ = progress.send(ProgressEvent {
                    completed_chunks: manifest.completed_chunks(),
                    total_chunks: plan.len(),
                    completed_samples: summary.samples,
                });
            }
        }

        if summary.cancelled {
            info!(run_id = %manifest.run_id, "run cancelled; manifest left resumable");
        } else {
            self.sink.finalize_run(&manifest.run_id).await?;
            info!(
                run_id = %manifest.run_id,
                samples = summary.samples,
                cache_hits = summary.cache_hits,
                early_exits = summary.early_exits,
                abstentions = summary.abstentions,
                agreement_pct = summary.gold_agreement_pct(),
                "run finished"
            );
        }

        Ok(summary)
    }

    /// Sort, persist, and mark one completed chunk. The single coordinating
    /// path for manifest mutation.
    async fn commit_chunk(
        &self,
        manifest: &mut RunManifest,
        chunk_index: usize,
        mut outcomes: Vec<SampleOutcome>,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        outcomes.sort_by(|a, b| a.ensemble.sample_id.cmp(&b.ensemble.sample_id));

        let judgements: Vec<Judgement> = outcomes
            .iter()
            .flat_map(|outcome| outcome.judgements.iter().cloned())
            .collect();
        let ensembles: Vec<EnsembleResult> = outcomes
            .iter()
            .map(|outcome| outcome.ensemble.clone())
            .collect();

        self.sink
            .write_judgements(&manifest.run_id, &judgements)
            .await?;
        self.sink.write_ensembles(&manifest.run_id, &ensembles).await?;
        self.sink
            .mark_chunk_complete(&manifest.run_id, chunk_index)
            .await?;
        manifest.mark_chunk_complete(chunk_index, Utc::now());

        summary.samples += outcomes.len();
        summary.judgements += judgements.len();
        summary.cache_hits += judgements.iter().filter(|j| j.cache_hit).count();
        summary.provider_failures += judgements
            .iter()
            .filter(|j| {
                j.warnings.iter().any(|w| {
                    w == warning::PROVIDER_EXHAUSTED || w == warning::PROVIDER_REJECTED
                })
            })
            .count();
        summary.parse_fallbacks += judgements
            .iter()
            .filter(|j| j.warnings.iter().any(|w| w == warning::PARSE_FAILURE))
            .count();
        summary.early_exits += ensembles
            .iter()
            .filter(|e| e.flags.iter().any(|f| f == flag::EARLY_EXIT_APPLIED))
            .count();
        summary.abstentions += ensembles.iter().filter(|e| e.is_abstention()).count();

        for outcome in &outcomes {
            if let Some(matched) = outcome.gold_match {
                summary.gold_total += 1;
                if matched {
                    summary.gold_matches += 1;
                }
            }
        }

        debug!(chunk = chunk_index, samples = outcomes.len(), "chunk committed");
        Ok(())
    }
}

/// Strategy parameters recorded in the manifest for auditing.
fn strategy_params(config: &RunConfig) -> serde_json::Value {
    serde_json::json!({
        "weights": config.weight_map(),
        "high_disagreement_threshold": config.aggregation.high_disagreement_threshold,
        "early_exit_threshold": config.early_exit_threshold,
        "chunk_size": config.chunk_size,
    })
}

/// A resumed run must be evaluating the same plan the manifest recorded.
fn verify_resume_plan(manifest: &RunManifest, plan: &ChunkPlan) -> Result<(), EngineError> {
    let matches = manifest.chunks.len() == plan.len()
        && manifest
            .chunks
            .iter()
            .zip(&plan.chunks)
            .all(|(state, chunk)| state.index == chunk.index && state.sample_count == chunk.len());
    if matches {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(
            "resume manifest does not match the current dataset/chunk plan".to_string(),
        ))
    }
}

/// Evaluate one sample: models in priority order, early exit honored, then
/// aggregation.
async fn process_sample(shared: &Shared, sample: &Sample) -> SampleOutcome {
    let rendered = prompt::render(sample, &shared.config.prompt);
    let model_count = shared.config.models.len();

    let mut judgements: Vec<Judgement> = Vec::with_capacity(model_count);
    let mut early_exit = false;
    let mut complete = true;

    for (position, model) in shared.config.models.iter().enumerate() {
        if shared.cancel.is_cancelled() {
            complete = false;
            break;
        }

        let judgement = judge_one(shared, sample, model, &rendered).await;

        let confident_enough = shared
            .config
            .early_exit_threshold
            .is_some_and(|threshold| judgement.confidence >= threshold);
        judgements.push(judgement);

        if confident_enough && position + 1 < model_count {
            debug!(
                sample_id = %sample.sample_id,
                model_id = %model.model_id,
                skipped = model_count - position - 1,
                "early exit: confidence threshold met"
            );
            early_exit = true;
            break;
        }
    }

    let ensemble = shared
        .aggregator
        .aggregate(&sample.sample_id, &judgements, early_exit);

    let gold_match = sample.gold_label.as_ref().and_then(|gold| {
        (ensemble.final_label != FinalLabel::Abstain)
            .then(|| ensemble.final_label.to_string() == gold.trim().to_ascii_lowercase())
    });

    SampleOutcome {
        judgements,
        ensemble,
        gold_match,
        complete,
    }
}

/// Execute one (sample, model) work unit: cache, then provider under retry,
/// then normalization.
async fn judge_one(
    shared: &Shared,
    sample: &Sample,
    model: &ModelConfig,
    rendered: &str,
) -> Judgement {
    let key = CacheKey::compute(sample, &model.model_id, rendered, &model.default_params);

    let mut pre_warnings = Vec::new();
    match shared.cache.lookup(&key).await {
        Ok(Some(hit)) => {
            debug!(
                sample_id = %sample.sample_id,
                model_id = %model.model_id,
                "cache hit"
            );
            return hit.into_cache_hit();
        }
        Ok(None) => {}
        Err(error) => {
            warn!(%error, "cache lookup failed, degrading to miss");
            pre_warnings.push(warning::CACHE_DEGRADED.to_string());
        }
    }

    // Pool permit + rate-limit token gate the actual provider call.
    let Some(pool) = shared.pools.get(&model.provider) else {
        // Unreachable when built through `EvalScheduler::new`, which pools
        // every registry tag.
        return fallback_judgement(
            sample,
            model,
            0,
            pre_warnings,
            format!("no worker pool for provider '{}'", model.provider),
        );
    };
    let Ok(_permit) = pool.workers.acquire().await else {
        // The semaphore is never closed while the scheduler is alive; if it
        // is, the run is tearing down and a conservative fallback is fine.
        return fallback_judgement(
            sample,
            model,
            0,
            pre_warnings,
            "worker pool closed".to_string(),
        );
    };
    pool.limiter.acquire().await;

    let timeout_ms = model
        .default_params
        .timeout_ms
        .unwrap_or(shared.config.scheduler.call_timeout_ms);

    let provider = Arc::clone(&pool.provider);
    let result = shared
        .retry
        .execute(|| {
            let provider = Arc::clone(&provider);
            async move {
                match tokio::time::timeout(
                    Duration::from_millis(timeout_ms),
                    provider.invoke(model, rendered),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(timeout_ms)),
                }
            }
        })
        .await;

    match result {
        Ok(outcome) => {
            let mut warnings = pre_warnings;
            warnings.extend(outcome.warnings);
            let mut judgement = normalizer::normalize(
                &outcome.response.raw_text,
                CallContext {
                    sample_id: sample.sample_id.clone(),
                    model_id: model.model_id.clone(),
                    provider: model.provider.clone(),
                    latency_ms: outcome.response.latency_ms,
                    attempts: outcome.attempts,
                    warnings,
                },
            );

            // Cache only provider-backed judgements; a failed store degrades
            // to a warning, never an abort.
            if let Err(error) = shared.cache.store(&key, &judgement).await {
                warn!(%error, "cache store failed");
                judgement.warnings.push(warning::CACHE_DEGRADED.to_string());
            }
            judgement
        }
        Err(RetryError::Exhausted {
            attempts,
            last,
            warnings,
        }) => {
            let mut all_warnings = pre_warnings;
            all_warnings.extend(warnings);
            all_warnings.push(warning::PROVIDER_EXHAUSTED.to_string());
            warn!(
                sample_id = %sample.sample_id,
                model_id = %model.model_id,
                attempts,
                %last,
                "provider exhausted, emitting fallback judgement"
            );
            fallback_judgement(sample, model, attempts, all_warnings, last.to_string())
        }
        Err(RetryError::Rejected {
            attempts,
            source,
            warnings,
        }) => {
            let mut all_warnings = pre_warnings;
            all_warnings.extend(warnings);
            all_warnings.push(warning::PROVIDER_REJECTED.to_string());
            warn!(
                sample_id = %sample.sample_id,
                model_id = %model.model_id,
                %source,
                "provider rejected the call, emitting fallback judgement"
            );
            fallback_judgement(sample, model, attempts, all_warnings, source.to_string())
        }
    }
}

/// Most conservative judgement for an unrecoverable provider failure.
fn fallback_judgement(
    sample: &Sample,
    model: &ModelConfig,
    attempts: u32,
    warnings: Vec<String>,
    rationale: String,
) -> Judgement {
    Judgement {
        sample_id: sample.sample_id.clone(),
        model_id: model.model_id.clone(),
        provider: model.provider.clone(),
        label: JudgeLabel::Irrelevant,
        score: None,
        confidence: 0.0,
        rationale: Some(rationale),
        raw_text: None,
        latency_ms: 0,
        attempts: attempts.max(1),
        cache_hit: false,
        warnings,
    }
}
