//! Retry logic with exponential backoff
//!
//! [`execute_with_retry`] wraps any network-bound operation (a listing page
//! load, an article fetch) and repeats it while it fails transiently.
//!
//! # Delay Calculation
//!
//! ```text
//! delay before attempt n (n >= 2) = base_delay * 2^(n-2) + uniform(0, jitter)
//! ```
//!
//! With the defaults (base 2s, jitter 3s, 3 attempts) the waits are roughly
//! 2-5s and 4-7s. No delay follows the final attempt.

use crate::crawler::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Default maximum attempts per operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

const DEFAULT_JITTER: Duration = Duration::from_secs(3);

/// Errors that tell the retry loop whether another attempt can help
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Outcome of an operation that did not succeed
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Every attempt failed with a retryable error
    #[error("All {attempts} attempts exhausted: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The operation failed with an error that retrying cannot fix
    #[error("Non-retryable failure on attempt {attempt}: {error}")]
    Terminal {
        attempt: u32,
        #[source]
        error: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// The error returned by the last attempt
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Terminal { error, .. } => error,
        }
    }

    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Terminal { attempt, .. } => *attempt,
        }
    }
}

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    max_attempts: u32,

    /// Delay before the first retry, doubled for each later one
    base_delay: Duration,

    /// Upper bound of the uniform random delay added to each wait
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` of zero is raised to one
    pub fn new(max_attempts: u32, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Deterministic part of the wait before `attempt`
    ///
    /// Zero for the first attempt, then `base_delay * 2^(attempt-2)`.
    pub fn base_component(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Full wait before `attempt`, jitter included
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        self.base_component(attempt) + self.sample_jitter()
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
        Duration::from_millis(jitter_ms)
    }
}

/// Runs `op` until it succeeds, fails terminally, or runs out of attempts
///
/// `label` names the operation in log output.
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::error::Error + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(error) if !error.is_retryable() => {
                tracing::debug!("{} failed terminally: {}", label, error);
                return Err(RetryError::Terminal { attempt, error });
            }
            Err(error) if attempt >= policy.max_attempts => {
                tracing::warn!(
                    "{} failed after {} attempts: {}",
                    label,
                    attempt,
                    error
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                let delay = policy.delay_before(attempt + 1);
                tracing::warn!(
                    "{} attempt {}/{} failed: {} (retrying in {:.1}s)",
                    label,
                    attempt,
                    policy.max_attempts,
                    error,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
