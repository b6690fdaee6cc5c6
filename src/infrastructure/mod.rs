//! Infrastructure layer: configuration loading, cache backends, provider
//! adapters, dataset sources, and output sinks.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod logging;
pub mod providers;
pub mod sink;
