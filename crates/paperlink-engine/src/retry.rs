use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::warn;

use paperlink_core::AppConfig;

/// Bounded exponential backoff with a per-attempt deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.retry.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry.initial_delay_ms),
            attempt_timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }

    /// Delay before retry number `retry` (0-based): `initial * 2^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay.saturating_mul(1u32 << retry.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

/// Result of a single attempt, tagged by whether retrying can help.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T> {
    Success(T),
    /// Rate limiting, timeouts, connection failures, 5xx.
    Retryable(String),
    /// Auth failures and malformed requests.
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub reason: String,
    pub fatal: bool,
}

/// Run `op` until it succeeds, fails fatally, or attempts run out.
///
/// An attempt exceeding `attempt_timeout` counts as retryable. Returns the
/// value with the number of attempts used.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<(T, u32), RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let outcome = match timeout(policy.attempt_timeout, op(attempt)).await {
            Ok(outcome) => outcome,
            Err(_) => AttemptOutcome::Retryable(format!(
                "timed out after {}ms",
                policy.attempt_timeout.as_millis()
            )),
        };

        match outcome {
            AttemptOutcome::Success(value) => return Ok((value, attempt)),
            AttemptOutcome::Fatal(reason) => {
                return Err(RetryFailure {
                    attempts: attempt,
                    reason,
                    fatal: true,
                });
            }
            AttemptOutcome::Retryable(reason) => {
                if attempt >= max_attempts {
                    return Err(RetryFailure {
                        attempts: attempt,
                        reason,
                        fatal: false,
                    });
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, %reason, "retrying model call");
                sleep(delay).await;
            }
        }
    }
}
