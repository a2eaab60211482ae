use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::resilience::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Returned instead of running the operation while a breaker rejects calls.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Circuit breaker {name} is open")]
pub struct BreakerOpen {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Failure gate for one external dependency.
///
/// Half-open admits a single trial call; callers arriving while the trial is
/// still running are rejected as if the breaker were open.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recovered(&self, inner: &BreakerInner, now: Instant) -> bool {
        match inner.last_failure_at {
            Some(at) => now.saturating_duration_since(at) > self.recovery_timeout,
            None => true,
        }
    }

    /// Whether a call made right now would be rejected.
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => !self.recovered(&inner, Instant::now()),
            CircuitState::HalfOpen => inner.trial_in_flight,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.failure_threshold,
            recovery_timeout_secs: self.recovery_timeout.as_secs(),
        }
    }

    /// Only meaningful in half-open: closes the breaker and clears the count.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.trial_in_flight = false;
            tracing::info!("Circuit breaker {} closed", self.name);
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
                tracing::warn!("Circuit breaker {} reopened after failed trial call", self.name);
            }
            CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    "Circuit breaker {} opened after {} failures",
                    self.name,
                    inner.failure_count
                );
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    /// Operator override back to closed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_at = None;
        inner.trial_in_flight = false;
    }

    fn acquire(&self) -> Result<TrialGuard<'_>, BreakerOpen> {
        let mut inner = self.lock();
        let rejected = || BreakerOpen {
            name: self.name.clone(),
        };

        match inner.state {
            CircuitState::Closed => Ok(TrialGuard {
                breaker: self,
                trial: false,
            }),
            CircuitState::Open => {
                if !self.recovered(&inner, Instant::now()) {
                    return Err(rejected());
                }
                tracing::info!("Circuit breaker {} transitioning to half-open", self.name);
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                Ok(TrialGuard {
                    breaker: self,
                    trial: true,
                })
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(rejected());
                }
                inner.trial_in_flight = true;
                Ok(TrialGuard {
                    breaker: self,
                    trial: true,
                })
            }
        }
    }

    /// Run `operation` behind the breaker.
    ///
    /// The whole operation counts as one outcome, so wrapping a retry sequence
    /// records a single failure once the retries are exhausted.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureKind + From<BreakerOpen>,
    {
        let _guard = self.acquire()?;
        let result = operation().await;

        match &result {
            Err(error) if error.trips_breaker() => self.record_failure(),
            _ => self.record_success(),
        }

        result
    }
}

/// Releases the half-open trial slot if the trial future is dropped before it
/// reports an outcome.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.trial {
            return;
        }
        let mut inner = self.breaker.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }
}

/// The named breakers of the process, one per external dependency.
#[derive(Debug, Default, Clone)]
pub struct BreakerRegistry {
    breakers: Vec<Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, breaker: Arc<CircuitBreaker>) -> Arc<CircuitBreaker> {
        self.breakers.push(breaker.clone());
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.iter().find(|b| b.name() == name).cloned()
    }

    pub fn status(&self) -> Vec<BreakerSnapshot> {
        self.breakers.iter().map(|b| b.snapshot()).collect()
    }
}
