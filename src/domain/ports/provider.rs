//! Provider capability port.
//!
//! Each judge model executes through a provider adapter selected by the tag
//! in its [`ModelConfig`]. Adapters can be:
//! - Ollama (local HTTP generate endpoint)
//! - Hugging Face inference endpoint
//! - Mock (tests and offline runs)
//!
//! The engine treats every adapter as an opaque capability: rendered prompt
//! in, raw text + latency out, with failures classified for the retry
//! executor.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::ModelConfig;

/// Raw result of one successful provider call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Unparsed model output
    pub raw_text: String,

    /// Wall-clock latency of the call in milliseconds
    pub latency_ms: u64,
}

/// Failure of one provider call, classified for retry eligibility.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The call exceeded its timeout
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// The provider throttled the call
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// 5xx-equivalent server-side failure
    #[error("server error: {0}")]
    Server(String),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The provider rejected the request as malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication or authorization failure
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The input cannot be handled by this provider/model
    #[error("unsupported input: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Transient failures are eligible for retry; permanent ones are not.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited(_) | Self::Server(_) | Self::Network(_)
        )
    }

    /// Short classification tag used in judgement warnings.
    pub const fn classification(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::Server(_) => "server_error",
            Self::Network(_) => "network_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Auth(_) => "auth_failure",
            Self::Unsupported(_) => "unsupported_input",
        }
    }
}

/// Port trait for provider adapters.
///
/// Implementations must be `Send + Sync`; the scheduler shares one adapter
/// instance across all workers of its pool.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Tag this adapter serves (matches `ModelConfig::provider`)
    fn provider_id(&self) -> &str;

    /// Execute one judge call.
    ///
    /// # Errors
    /// - transient ([`ProviderError::is_transient`]): the retry executor may
    ///   re-attempt the call
    /// - permanent: the call is abandoned immediately
    async fn invoke(
        &self,
        model: &ModelConfig,
        prompt: &str,
    ) -> Result<ProviderResponse, ProviderError>;
}
