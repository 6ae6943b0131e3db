//! Exponential backoff around source queries and index writes.

use std::future::Future;
use std::time::Duration;

use indexer_config::shared::RetryConfig;
use rand::Rng;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::EtlResult;

/// Retries transient failures with exponential backoff and jitter.
///
/// Non-transient errors are returned immediately. Transient errors are retried until
/// the total elapsed time since the first failure reaches the configured budget, after
/// which the last error is returned.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy that never waits before retrying, for tests.
    pub fn immediate() -> Self {
        Self::new(RetryConfig {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            max_elapsed_ms: 0,
            jitter_ratio: 0.0,
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// The base delay is `initial * multiplier^(attempt - 1)` capped at the maximum
    /// delay, then stretched by a random factor in `[1, 1 + jitter_ratio)`.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = self.config.backoff_multiplier.powi(exponent);
        let base_delay_ms = self.config.initial_delay_ms as f64 * multiplier;

        let capped_delay_ms = base_delay_ms.min(self.config.max_delay_ms as f64);

        let jitter_factor = rand::rng().random::<f64>() * self.config.jitter_ratio;
        let jittered_delay_ms = capped_delay_ms * (1.0 + jitter_factor);

        Duration::from_millis(jittered_delay_ms as u64)
    }

    /// Runs `operation` until it succeeds, fails permanently or exhausts the budget.
    ///
    /// With a zero elapsed budget, transient failures are retried exactly once.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> EtlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EtlResult<T>>,
    {
        let mut attempt: u32 = 0;
        let mut first_failure: Option<Instant> = None;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err);
            }

            let started = *first_failure.get_or_insert_with(Instant::now);
            attempt += 1;

            if attempt > 1 && started.elapsed() >= self.config.max_elapsed() {
                error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %err,
                    "retry budget exhausted"
                );

                return Err(err);
            }

            let delay = self.calculate_backoff(attempt);
            warn!(
                operation = operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );

            tokio::time::sleep(delay).await;
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::{ErrorKind, EtlError};
    use crate::etl_error;

    fn config() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 8000,
            backoff_multiplier: 2.0,
            max_elapsed_ms: 30000,
            jitter_ratio: 0.0,
        }
    }

    fn transient() -> EtlError {
        etl_error!(ErrorKind::SourceConnectionFailed, "Connection refused")
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(config());

        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.calculate_backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.calculate_backoff(4), Duration::from_millis(8000));
        assert_eq!(policy.calculate_backoff(10), Duration::from_millis(8000));
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let policy = RetryPolicy::new(RetryConfig {
            jitter_ratio: 0.5,
            ..config()
        });

        for _ in 0..50 {
            let delay = policy.calculate_backoff(1);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay < Duration::from_millis(1500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let policy = RetryPolicy::new(config());
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy
            .run("flaky", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let policy = RetryPolicy::new(config());
        let calls = Arc::new(AtomicUsize::new(0));

        let result: EtlResult<()> = policy
            .run("broken", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(etl_error!(ErrorKind::SourceSchemaError, "Missing column"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::SourceSchemaError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_returns_last_error() {
        let policy = RetryPolicy::new(config());
        let calls = Arc::new(AtomicUsize::new(0));

        let result: EtlResult<()> = policy
            .run("down", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::SourceConnectionFailed);
        // Delays of 1, 2, 4, 8, 8, 8 seconds pass the 30 second budget after 31 seconds.
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }
}
