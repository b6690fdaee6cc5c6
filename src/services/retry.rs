//! Retry executor: bounded attempts with exponential backoff.
//!
//! Wraps one provider invocation and drives it through an explicit attempt
//! state machine: each failure is classified as transient (retry-eligible)
//! or permanent (abandon immediately), and every failed attempt appends a
//! classification warning that ends up on the resulting judgement.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;
use crate::domain::ports::provider::{ProviderError, ProviderResponse};

/// Successful outcome of a retried call.
#[derive(Debug)]
pub struct RetryOutcome {
    pub response: ProviderResponse,

    /// Attempts consumed, including the successful one (>= 1)
    pub attempts: u32,

    /// One warning per failed attempt that preceded success
    pub warnings: Vec<String>,
}

/// Terminal failure of a retried call.
#[derive(Debug)]
pub enum RetryError {
    /// Transient failures persisted past `max_attempts`
    Exhausted {
        attempts: u32,
        last: ProviderError,
        warnings: Vec<String>,
    },

    /// A permanent failure on some attempt; no further attempts were made
    Rejected {
        attempts: u32,
        source: ProviderError,
        warnings: Vec<String>,
    },
}

/// What to do after a failed attempt.
enum Decision {
    Retry(Duration),
    GiveUp,
}

/// Executes provider calls under the configured retry policy.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Drive `operation` to success or terminal failure.
    ///
    /// The operation is attempted at most `max_attempts` times. Transient
    /// failures back off exponentially between attempts
    /// (`min(initial * 2^n, max)`); a permanent failure aborts immediately.
    pub async fn execute<F, Fut>(&self, mut operation: F) -> Result<RetryOutcome, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ProviderResponse, ProviderError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut warnings = Vec::new();

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, "provider call attempt");

            match operation().await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(attempt, "provider call succeeded after retries");
                    }
                    return Ok(RetryOutcome {
                        response,
                        attempts: attempt,
                        warnings,
                    });
                }
                Err(error) => {
                    warnings.push(format!(
                        "attempt {attempt}/{max_attempts} failed ({}): {error}",
                        error.classification()
                    ));

                    match self.decide(&error, attempt, max_attempts) {
                        Decision::Retry(backoff) => {
                            warn!(
                                attempt,
                                backoff_ms = backoff.as_millis() as u64,
                                %error,
                                "transient provider failure, retrying"
                            );
                            sleep(backoff).await;
                        }
                        Decision::GiveUp if error.is_transient() => {
                            warn!(attempt, %error, "provider exhausted");
                            return Err(RetryError::Exhausted {
                                attempts: attempt,
                                last: error,
                                warnings,
                            });
                        }
                        Decision::GiveUp => {
                            debug!(attempt, %error, "permanent provider failure, not retrying");
                            return Err(RetryError::Rejected {
                                attempts: attempt,
                                source: error,
                                warnings,
                            });
                        }
                    }
                }
            }
        }

        unreachable!("loop exits via success or GiveUp before attempts run out")
    }

    fn decide(&self, error: &ProviderError, attempt: u32, max_attempts: u32) -> Decision {
        if error.is_transient() && attempt < max_attempts {
            Decision::Retry(self.backoff(attempt - 1))
        } else {
            Decision::GiveUp
        }
    }

    /// Exponential backoff: `min(initial * 2^n, max)` for the n-th failure
    /// (0-indexed).
    fn backoff(&self, failure_index: u32) -> Duration {
        let backoff_ms = self
            .config
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(failure_index))
            .min(self.config.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }
}
