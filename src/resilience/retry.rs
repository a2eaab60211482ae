use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, Retryable};

use crate::resilience::{FailureKind, RandomSource};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry `attempt` (1-based):
    /// `min(initial_delay * base^(attempt-1), max_delay)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.base.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

/// Backoff schedule handed to `backon`: yields one delay per allowed retry.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    random: Arc<dyn RandomSource>,
}

#[derive(Debug)]
pub struct ExponentialDelays {
    policy: RetryPolicy,
    random: Arc<dyn RandomSource>,
    attempt: u32,
}

impl BackoffBuilder for ExponentialBackoff {
    type Backoff = ExponentialDelays;

    fn build(self) -> Self::Backoff {
        ExponentialDelays {
            policy: self.policy,
            random: self.random,
            attempt: 0,
        }
    }
}

impl Iterator for ExponentialDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt as usize >= self.policy.max_retries {
            return None;
        }
        self.attempt += 1;

        let delay = self.policy.delay(self.attempt);
        if self.policy.jitter {
            // Uniform factor in [0.5, 1.0].
            Some(delay.mul_f64(0.5 + 0.5 * self.random.unit()))
        } else {
            Some(delay)
        }
    }
}

/// Bounded exponential-backoff retry around a fallible async operation.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    random: Arc<dyn RandomSource>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, random: Arc<dyn RandomSource>) -> Self {
        Self { policy, random }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            policy: self.policy.clone(),
            random: self.random.clone(),
        }
    }

    /// Retry `operation` while its error reports itself transient.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureKind + Display,
    {
        self.execute_when(operation, |error: &E| error.is_transient())
            .await
    }

    /// Retry `operation` while `retryable` accepts the error. Anything else is
    /// returned immediately; the last error is returned once retries run out.
    pub async fn execute_when<T, E, F, Fut, P>(&self, operation: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureKind + Display,
        P: FnMut(&E) -> bool,
    {
        operation
            .retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(retryable)
            .adjust(|error: &E, delay: Option<Duration>| {
                delay.map(|computed| error.retry_after().unwrap_or(computed))
            })
            .notify(|error: &E, delay: Duration| {
                tracing::warn!("Retrying in {:?} after transient failure: {}", delay, error);
            })
            .await
    }
}
