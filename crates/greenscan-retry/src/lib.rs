//! Retry/backoff executor for remote calls
//!
//! Wraps any remote operation in capped exponential backoff. Errors are
//! classified by [`RemoteError::is_retryable`], the single classification
//! function, never by inspecting messages here.
//!
//! ## Backoff Schedule (defaults)
//!
//! | Attempt | Delay |
//! |---------|-------|
//! | 0       | 1s    |
//! | 1       | 2s    |
//! | 2       | 4s    |
//!
//! capped at 10s, 3 retries after the initial attempt. A terminal error, or
//! a retryable error once the budget is spent, propagates unchanged; the
//! executor never swallows or rewraps the last error.
//!
//! The executor holds no shared mutable state and is safe to call
//! concurrently for independent operations. Callers sharing one queue must
//! serialize into a single in-flight execution; that latch lives with the
//! queue processor, not here.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use greenscan_core::config::RetryConfig;
use greenscan_core::domain::RemoteError;

/// Backoff policy for one class of remote operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            backoff_factor: config.backoff_factor,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt number `attempt` (0-based):
    /// `min(initial · factor^attempt, max)`, saturating on overflow.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .backoff_factor
            .checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }
}

/// Executes an async remote operation with exponential backoff retry
///
/// Retries only errors classified retryable; the first terminal error and
/// the last error after an exhausted budget are returned unchanged.
///
/// # Arguments
/// * `operation` - Name used in structured log fields
/// * `policy` - The backoff policy to apply
/// * `f` - Closure producing a fresh future per attempt
pub async fn execute<F, Fut, T>(
    operation: &str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= policy.max_retries || !err.is_retryable() {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    kind = err.kind(),
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
