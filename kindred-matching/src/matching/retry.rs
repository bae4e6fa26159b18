//! Retry discipline shared by every reasoning-model call.
//!
//! - malformed output: retried once, immediately
//! - transient failure or per-call timeout: exponential backoff up to `max_attempts`
//! - anything else: returned as is

use std::future::Future;
use std::time::Duration;

use crate::clients::llm::ModelError;
use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts against one model (including the first).
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Bound on a single provider call.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            call_timeout: Duration::from_secs(45),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: config.retry_base_delay(),
            call_timeout: config.provider_timeout(),
            ..Self::default()
        }
    }

    /// Same timeout, but no backoff retries. Used for the fallback model.
    pub fn single_attempt(&self) -> Self {
        Self {
            max_attempts: 1,
            ..self.clone()
        }
    }

    /// Compute the delay for retry `n` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay * 2u32.saturating_pow(attempt);
        delay.min(self.max_delay)
    }

    /// Longest a caller waits before transient failures are given up on:
    /// every attempt hitting `call_timeout`, plus the backoff between them.
    pub fn exhaustion_time(&self) -> Duration {
        let backoff: Duration = (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for(attempt))
            .sum();
        self.call_timeout * self.max_attempts + backoff
    }
}

pub async fn call_with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ModelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut transient_failures = 0;
    let mut malformed_retried = false;

    loop {
        let result = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Transient(format!(
                "no response within {:?}",
                policy.call_timeout
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(ModelError::Malformed(reason)) if !malformed_retried => {
                malformed_retried = true;
                tracing::warn!(operation, %reason, "malformed model output, retrying once");
            }
            Err(err @ ModelError::Transient(_)) => {
                transient_failures += 1;
                if transient_failures >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for(transient_failures - 1);
                tracing::warn!(
                    operation,
                    attempt = transient_failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provider failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
