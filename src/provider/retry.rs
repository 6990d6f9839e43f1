// src/provider/retry.rs — Retry with exponential backoff for agent calls
//
// Retries: rate limits (429), server errors (5xx), timeouts, connection resets.
// Does NOT retry: bad request (400), auth errors (401, 403), policy rejections.
// Only the final outcome leaves this module; intermediate attempts are logged.

use std::time::{Duration, Instant};

use super::{Completion, ModelConfig, ModelProvider};
use crate::core::types::AgentRole;
use crate::infra::config::BackoffConfig;
use crate::infra::errors::AutonoError;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(3, &BackoffConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(max_retries: u32, backoff: &BackoffConfig) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(backoff.base_delay_ms),
            multiplier: backoff.multiplier,
            max_delay: Duration::from_millis(backoff.max_delay_ms),
        }
    }

    /// No waiting between attempts. Used by tests and simulation runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32, rate_limit_delay: Option<Duration>) -> Duration {
        // A server-provided wait wins, still bounded by the cap.
        if let Some(hint) = rate_limit_delay {
            return hint.min(self.max_delay);
        }
        let base_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }
}

/// Final result of a retried call.
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<Completion, AutonoError>,
    /// Total attempts made, including the first.
    pub attempts: u32,
    /// Wall-clock time across all attempts and backoff sleeps.
    pub elapsed: Duration,
}

/// Extract rate-limit retry delay from the error, if available.
fn rate_limit_delay(error: &AutonoError) -> Option<Duration> {
    match error {
        AutonoError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Invoke `provider`, retrying transient failures per `policy`.
pub async fn invoke_with_retry(
    provider: &dyn ModelProvider,
    role: AgentRole,
    prompt: &str,
    model: &ModelConfig,
    policy: &RetryPolicy,
) -> RetryOutcome {
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        let result = provider.invoke(role, prompt, model).await;
        let err = match result {
            Ok(completion) => {
                return RetryOutcome {
                    result: Ok(completion),
                    attempts: attempt + 1,
                    elapsed: started.elapsed(),
                }
            }
            Err(e) => e,
        };

        if !err.is_retriable() || attempt >= policy.max_retries {
            if err.is_retriable() {
                tracing::warn!(
                    provider = provider.id(),
                    role = %role,
                    attempts = attempt + 1,
                    "Retries exhausted: {}",
                    err
                );
            }
            return RetryOutcome {
                result: Err(err),
                attempts: attempt + 1,
                elapsed: started.elapsed(),
            };
        }

        let delay = policy.delay_for_attempt(attempt, rate_limit_delay(&err));
        tracing::warn!(
            provider = provider.id(),
            role = %role,
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying after error: {}",
            err
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}
