//! Retry engine: classification-aware exponential backoff.
//!
//! [`RetryConfig`] controls the attempt budget and delay curve;
//! [`RetryExecutor`] wraps an async operation and re-dispatches it while
//! [`SqlForgeError::is_transient()`] says the failure may heal. Permanent
//! errors short-circuit; an exhausted budget surfaces as
//! [`SqlForgeError::RetriesExhausted`] wrapping the last failure.
//!
//! Cancellation propagates the Rust way: dropping the future aborts the
//! in-flight attempt and any backoff sleep immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::telemetry;
use crate::{Result, SqlForgeError};

/// Backoff policy driving the retry engine.
///
/// Attempt `i` (0-based) sleeps `base_delay * multiplier^i` before the
/// next try, clamped to `max_delay`; jitter spreads concurrent callers
/// apart so they don't re-dial a struggling provider in lockstep. Knobs
/// chain fluently:
///
/// ```rust
/// # use sqlforge::retry::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .base_delay(Duration::from_millis(250))
///     .multiplier(1.5)
///     .max_attempts(4);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempt budget, first dispatch included; 1 means a single
    /// try. Spending it all surfaces as
    /// [`SqlForgeError::RetriesExhausted`]. Default: 3.
    pub max_attempts: u32,
    /// Sleep inserted before the second attempt; every later sleep grows
    /// from here. Default: 1s.
    pub base_delay: Duration,
    /// Ceiling on the backoff curve, so a long outage never produces
    /// minute-scale sleeps. Default: 30s.
    pub max_delay: Duration,
    /// Per-attempt growth factor of the curve. Default: 2.0.
    pub multiplier: f64,
    /// Overshoot each sleep by a random slice of up to a quarter of the
    /// computed delay. Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// The default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries: one attempt, then the error stands.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the attempt budget (first dispatch included).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the starting point of the backoff curve.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the ceiling on backoff growth.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the per-attempt growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Turn random delay spreading on or off.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// The raw curve value for a 0-based attempt index:
    /// `base_delay * multiplier^attempt`, clamped to `max_delay` and with
    /// no jitter applied — [`jittered_delay()`](Self::jittered_delay) is
    /// what actually gets slept.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exact = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = exact.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// The delay actually slept before the retry following `attempt`.
    ///
    /// When jitter is enabled, adds a uniform sample in `[0, d/4]` on top of
    /// the exponential delay. The uniform source is infallible here; were it
    /// ever to fail, the fallback is the deterministic midpoint `d/8` —
    /// backoff must never fail for lack of randomness.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if !self.jitter {
            return base;
        }
        let span = base / 4;
        if span.is_zero() {
            return base;
        }
        let extra = rand::rng().random_range(Duration::ZERO..=span);
        base + extra
    }
}

/// Executes operations under a [`RetryConfig`].
///
/// The operation closure is invoked once per attempt; it must be safe to
/// re-run (requests are immutable per call, so re-dispatch is).
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create an executor with the given policy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The policy this executor runs under.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run an operation with no interesting return value.
    pub async fn execute<F, Fut>(&self, f: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.execute_with_result(f).await
    }

    /// Run an operation, retrying transient failures, and return its value.
    pub async fn execute_with_result<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last_err: Option<SqlForgeError> = None;
        for attempt in 0..attempts {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    metrics::counter!(telemetry::RETRIES_TOTAL).increment(1);
                    if attempt + 1 < attempts {
                        let delay = self.config.jittered_delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            backoff_ms = delay.as_millis() as u64,
                            error = %e,
                            "transient failure, backing off before next attempt"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_err = Some(e);
                }
            }
        }
        let message = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts executed".to_string());
        Err(SqlForgeError::RetriesExhausted { attempts, message })
    }
}
