//! Circuit breaker guarding provider dispatch.
//!
//! Classic three-state design: `closed` (normal flow), `open` (calls
//! rejected until a reset timeout elapses), `half-open` (a bounded number
//! of probe calls decide between re-opening and closing). State lives
//! behind one RW lock; the guarded operation itself always runs outside
//! the lock so a slow provider call never blocks state reads.

use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::telemetry;
use crate::{Result, SqlForgeError};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker tuning knobs.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `closed` before the circuit opens. Default: 5.
    pub failure_threshold: u32,
    /// How long `open` rejects before admitting a probe. Default: 60s.
    pub reset_timeout: Duration,
    /// Concurrent/sequential probe budget while `half-open`. Default: 3.
    pub half_open_max_calls: u32,
    /// Successes required in `half-open` to close. Default: 2.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn half_open_max_calls(mut self, n: u32) -> Self {
        self.half_open_max_calls = n;
        self
    }

    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_calls: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_calls: 0,
            half_open_successes: 0,
            last_failure: None,
            last_success: None,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
        }
    }
}

/// Point-in-time metrics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerMetrics {
    pub state: CircuitState,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<Instant>,
    pub last_failure: Option<Instant>,
    /// `total_successes / total_requests`, 0 when nothing ran.
    pub success_rate: f64,
    /// `total_failures / total_requests`, 0 when nothing ran.
    pub failure_rate: f64,
}

/// Failure-threshold protected gate around an async call.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(BreakerState::new()),
        }
    }

    /// Run `f` through the gate.
    ///
    /// Rejects with [`SqlForgeError::CircuitOpen`] while the circuit
    /// disallows traffic; otherwise runs the operation outside the lock
    /// and records its outcome.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;
        let result = f().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Gate admission. Transitions `open → half-open` when the reset
    /// timeout has elapsed; enforces the half-open probe budget.
    fn admit(&self) -> Result<()> {
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.reset_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_calls = 1;
                    inner.half_open_successes = 0;
                    Ok(())
                } else {
                    metrics::counter!(telemetry::BREAKER_REJECTIONS_TOTAL).increment(1);
                    Err(SqlForgeError::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls >= self.config.half_open_max_calls {
                    metrics::counter!(telemetry::BREAKER_REJECTIONS_TOTAL).increment(1);
                    return Err(SqlForgeError::CircuitOpen);
                }
                inner.half_open_calls += 1;
                debug!(
                    in_flight = inner.half_open_calls,
                    max = self.config.half_open_max_calls,
                    "circuit breaker: half-open probe admitted"
                );
                Ok(())
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        inner.total_requests += 1;
        inner.total_successes += 1;
        inner.last_success = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                    inner.consecutive_failures = 0;
                    inner.half_open_calls = 0;
                    inner.half_open_successes = 0;
                }
            }
            // A success observed while open changes nothing; the only way
            // out of open is admission after the reset timeout.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        inner.total_requests += 1;
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        if inner.state == to {
            return;
        }
        info!(from = %inner.state, to = %to, "circuit breaker transition");
        metrics::counter!(telemetry::BREAKER_TRANSITIONS_TOTAL, "to" => to.as_str())
            .increment(1);
        inner.state = to;
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.read().expect("breaker lock poisoned").state
    }

    /// Force the circuit closed and clear failure counters.
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        self.transition(&mut inner, CircuitState::Closed);
        inner.consecutive_failures = 0;
        inner.half_open_calls = 0;
        inner.half_open_successes = 0;
    }

    /// Metrics snapshot.
    pub fn metrics(&self) -> BreakerMetrics {
        let inner = self.inner.read().expect("breaker lock poisoned");
        let total = inner.total_requests as f64;
        let (success_rate, failure_rate) = if inner.total_requests == 0 {
            (0.0, 0.0)
        } else {
            (
                inner.total_successes as f64 / total,
                inner.total_failures as f64 / total,
            )
        };
        BreakerMetrics {
            state: inner.state,
            total_requests: inner.total_requests,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            consecutive_failures: inner.consecutive_failures,
            last_success: inner.last_success,
            last_failure: inner.last_failure,
            success_rate,
            failure_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker
            .call(|| async { Err::<(), _>(SqlForgeError::Provider("503".into())) })
            .await;
    }

    async fn succeed(breaker: &CircuitBreaker) {
        breaker
            .call(|| async { Ok::<_, SqlForgeError>(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn totals_stay_consistent() {
        let breaker = CircuitBreaker::default();
        succeed(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker).await;
        let metrics = breaker.metrics();
        assert_eq!(
            metrics.total_requests,
            metrics.total_successes + metrics.total_failures
        );
        assert_eq!(metrics.total_requests, 3);
    }

    #[tokio::test]
    async fn success_in_closed_clears_consecutive_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::new().failure_threshold(3));
        fail(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_forces_closed() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::new().failure_threshold(1));
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn rates_reflect_outcomes() {
        let breaker = CircuitBreaker::default();
        succeed(&breaker).await;
        succeed(&breaker).await;
        fail(&breaker).await;
        fail(&breaker).await;
        let metrics = breaker.metrics();
        assert!((metrics.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((metrics.failure_rate - 0.5).abs() < f64::EPSILON);
    }
}
