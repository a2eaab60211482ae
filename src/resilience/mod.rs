pub mod breaker;
pub mod random;
pub mod retry;
pub mod soft_fail;

use std::time::Duration;

pub use breaker::{BreakerOpen, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use random::{RandomSource, SeededRandom, ThreadRandom, shuffle};
pub use retry::{RetryExecutor, RetryPolicy};
pub use soft_fail::{soft_fail, soft_fail_sync};

/// Classification every error crossing the resilience layer must provide.
pub trait FailureKind {
    /// Worth another attempt after a delay.
    fn is_transient(&self) -> bool;

    /// Server-specified wait that replaces the computed backoff.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Counts against the dependency's circuit breaker. Errors that prove the
    /// dependency answered (bad credentials, missing resources) do not.
    fn trips_breaker(&self) -> bool {
        self.is_transient()
    }
}
