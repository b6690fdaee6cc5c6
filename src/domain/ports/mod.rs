//! Ports: trait seams between the engine and its collaborators.

pub mod cache;
pub mod dataset;
pub mod provider;
pub mod sink;

pub use cache::{CacheError, CacheKey, JudgementCache};
pub use dataset::{DatasetError, DatasetSource};
pub use provider::{Provider, ProviderError, ProviderResponse};
pub use sink::{OutputSink, SinkError};
