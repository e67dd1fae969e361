use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::{LlmProvider, LlmRequest};

/// Exponential backoff for generation calls.
///
/// The wait before attempt `n + 1` is `multiplier * 2^(n - 1)`, clamped to
/// `[min_delay, max_delay]`. With the defaults that is 4s, 4s, 4s, 8s, ...
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let raw = self.multiplier.saturating_mul(1u32 << exponent);
        raw.clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }
}

/// Terminal outcome of a generation stage that did not produce text.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Every attempt failed; carries the error of the last attempt as-is.
    #[error("{stage} failed after {attempts} attempt(s): {last_error:#}")]
    Exhausted {
        stage: &'static str,
        attempts: u32,
        last_error: anyhow::Error,
    },
    #[error("{stage} needs an API key: set the {env_var} environment variable")]
    MissingCredential {
        stage: &'static str,
        env_var: String,
    },
}

impl GenerationError {
    pub fn attempts(&self) -> u32 {
        match self {
            GenerationError::Exhausted { attempts, .. } => *attempts,
            GenerationError::MissingCredential { .. } => 0,
        }
    }
}

/// Run a generation request under `policy`, returning the first non-empty completion.
///
/// Any failure is retried, including a completion that is blank after trimming.
pub async fn generate_with_retry(
    provider: &dyn LlmProvider,
    request: &LlmRequest,
    policy: &RetryPolicy,
    stage: &'static str,
) -> Result<String, GenerationError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match provider.generate(request.clone()).await {
            Ok(response) if response.content.trim().is_empty() => {
                Err(anyhow::anyhow!("model returned an empty completion"))
            }
            Ok(response) => Ok(response),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(response) => {
                info!(
                    stage,
                    attempt,
                    model = %response.model,
                    total_tokens = response.usage.total_tokens,
                    "generation succeeded"
                );
                return Ok(response.content);
            }
            Err(e) if attempt >= max_attempts => {
                return Err(GenerationError::Exhausted {
                    stage,
                    attempts: attempt,
                    last_error: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    stage,
                    attempt,
                    max_attempts,
                    ?delay,
                    error = %e,
                    "generation attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
