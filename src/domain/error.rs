use thiserror::Error;

use super::ports::provider::ProviderError;

/// Engine-level error taxonomy.
///
/// Only `InvalidConfig` is fatal to a run; everything else is scoped to a
/// single (sample, model) unit and recovered locally into warnings or flags
/// on the resulting record.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration-level failure; aborts before execution
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transient provider failures persisted past the maximum attempt count
    #[error("provider exhausted after {attempts} attempts: {last}")]
    ProviderExhausted {
        attempts: u32,
        #[source]
        last: ProviderError,
    },

    /// A permanent provider failure; not retried
    #[error("provider rejected the call on attempt {attempts}: {source}")]
    ProviderRejected {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
}
