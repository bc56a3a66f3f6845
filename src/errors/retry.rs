use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::AgentError;

/// Longest delay a policy may configure between two attempts.
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Bounded retry with exponential backoff.
///
/// Stateless: one policy can be shared by any number of concurrent callers.
/// An operation is attempted at most `max_retries + 1` times; before retry
/// `n` (0-indexed) the caller sleeps `min(base_delay * exponential_base^n, max_delay)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub exponential_base: f64,
    /// Upper bound of a random fraction of the delay added on top of it.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 60.0,
            exponential_base: 2.0,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, exponential_base: f64) -> Self {
        Self {
            max_retries,
            base_delay_secs: base_delay.as_secs_f64(),
            max_delay_secs: max_delay.as_secs_f64(),
            exponential_base,
            jitter: 0.0,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if !(self.base_delay_secs > 0.0) {
            return Err(AgentError::Config("retry_policy.base_delay_secs must be > 0".into()));
        }
        if self.max_delay_secs < self.base_delay_secs {
            return Err(AgentError::Config(
                "retry_policy.max_delay_secs must be >= base_delay_secs".into(),
            ));
        }
        if !(self.max_delay_secs <= MAX_DELAY_SECS) {
            return Err(AgentError::Config(format!(
                "retry_policy.max_delay_secs must be <= {}",
                MAX_DELAY_SECS
            )));
        }
        if !(self.exponential_base > 1.0) {
            return Err(AgentError::Config("retry_policy.exponential_base must be > 1".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(AgentError::Config("retry_policy.jitter must be within [0, 1]".into()));
        }
        Ok(())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.exponential_base.powi(attempt.min(i32::MAX as u32) as i32);
        let mut secs = (self.base_delay_secs * exp).min(self.max_delay_secs);
        if self.jitter > 0.0 {
            secs += secs * self.jitter * rand::random::<f64>();
        }
        Duration::try_from_secs_f64(secs.clamp(0.0, 2.0 * MAX_DELAY_SECS)).unwrap_or(Duration::ZERO)
    }

    /// Whether a failure on `attempt` (0-indexed) should be followed by another attempt.
    pub fn should_retry(&self, attempt: u32, error: &AgentError) -> bool {
        attempt < self.max_retries && error.classify().retryable
    }

    /// Execute an async operation under this policy.
    ///
    /// Non-retryable errors are returned unchanged after the first failure.
    /// Once every attempt has failed, the last error is returned wrapped in
    /// `AgentError::RetryExhausted`.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut factory: F) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0u32;

        loop {
            match factory().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(operation = operation_name, attempt = attempt + 1, "Succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let classification = e.classify();

                    if !classification.retryable {
                        warn!(
                            operation = operation_name,
                            error_type = classification.error_type,
                            error = %e,
                            "Non-retryable error, failing immediately"
                        );
                        return Err(e);
                    }

                    if !self.should_retry(attempt, &e) {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = max_attempts,
                            error = %e,
                            "Max retries exhausted"
                        );
                        return Err(AgentError::RetryExhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt + 1,
                            source: Box::new(e),
                        });
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max = max_attempts,
                        error_type = classification.error_type,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "Retrying after error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
