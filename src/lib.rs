//! Quorum - LLM judge-ensemble orchestrator
//!
//! Quorum sends evaluation samples to multiple LLM "judge" models,
//! normalizes their heterogeneous outputs into canonical judgements, and
//! combines the per-model judgements into one ensemble verdict per sample.
//! Runs are chunked, cached, rate-limited, retried, and resumable after a
//! crash.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): record shapes, run configuration, port
//!   traits, error taxonomy
//! - **Service Layer** (`services`): chunk planner, retry executor,
//!   judgement normalizer, ensemble aggregator, concurrency scheduler
//! - **Infrastructure Layer** (`infrastructure`): config loading, cache
//!   backends, provider adapters, dataset sources, output sinks
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use quorum::services::EvalScheduler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Build collaborators, construct a scheduler, and run.
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    DisagreementMetrics, EnsembleResult, FinalLabel, JudgeLabel, Judgement, ModelConfig,
    RunConfig, RunManifest, Sample,
};
pub use domain::ports::{DatasetSource, JudgementCache, OutputSink, Provider};
pub use domain::EngineError;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CancelHandle, EnsembleAggregator, EvalScheduler, RunSummary};
