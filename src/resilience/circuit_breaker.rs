//! # Circuit Breaker
//!
//! Per-target failure tracker following the classic three-state pattern:
//! Closed (normal operation), Open (failing fast), and Half-Open (testing
//! recovery). State lives only in process memory and resets on restart.
//!
//! Transitions: `closed -> open` once consecutive failures reach the
//! threshold; `open -> half_open` after the reset timeout elapses;
//! `half_open -> closed` on the first success; `half_open -> open` on the
//! first failure. While open and inside the cooldown window, calls are
//! rejected without invoking the wrapped operation.

use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, all calls are allowed through
    Closed = 0,
    /// Failure mode, all calls fail fast without executing
    Open = 1,
    /// Testing recovery, exactly one trial call is admitted
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            // Default to the safest state
            _ => CircuitState::Open,
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls without an attempt
    #[error("Circuit breaker is open for {target}")]
    CircuitOpen { target: String },

    /// Operation executed and failed; the failure was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Point-in-time view of a breaker, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub target: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Elapsed time since the most recent failure, if any
    #[serde(skip)]
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug, Default)]
struct BreakerInner {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Core circuit breaker with atomic state reads and mutex-guarded transitions
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Target name for logging and registry lookup
    target: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the given target
    pub fn new(target: String, config: CircuitBreakerConfig) -> Self {
        info!(
            target_name = %target,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            target,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn set_state(&self, state: CircuitState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// Rejected calls (`CircuitOpen`) never invoke the operation. State
    /// transitions happen only inside this call path, atomically with
    /// respect to the call that caused them.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow_call().await {
            debug!(target_name = %self.target, "Call rejected, circuit open");
            return Err(CircuitBreakerError::CircuitOpen {
                target: self.target.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed(e))
            }
        }
    }

    /// Whether a call may proceed. The caller that flips `open -> half_open`
    /// owns the single trial; concurrent callers see half-open and are
    /// rejected until the trial resolves.
    async fn should_allow_call(&self) -> bool {
        let inner = self.inner.lock().await;
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => match inner.last_failure {
                Some(at) if at.elapsed() >= self.config.reset_timeout => {
                    self.set_state(CircuitState::HalfOpen);
                    info!(target_name = %self.target, "🟡 Circuit breaker half-open (testing recovery)");
                    true
                }
                Some(_) => false,
                None => {
                    // Open without a timestamp should not happen; allow the call
                    warn!(target_name = %self.target, "Circuit open but no failure timestamp recorded");
                    true
                }
            },
            CircuitState::HalfOpen => false,
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count = 0;

        if self.state() == CircuitState::HalfOpen {
            inner.last_failure = None;
            self.set_state(CircuitState::Closed);
            info!(target_name = %self.target, "🟢 Circuit breaker closed (recovered)");
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match self.state() {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.set_state(CircuitState::Open);
                    warn!(
                        target_name = %self.target,
                        consecutive_failures = inner.failure_count,
                        failure_threshold = self.config.failure_threshold,
                        "🔴 Circuit breaker opened (failing fast)"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure during the trial reopens the circuit and
                // restarts the cooldown timer
                self.set_state(CircuitState::Open);
                warn!(target_name = %self.target, "🔴 Circuit breaker reopened (trial failed)");
            }
            CircuitState::Open => {}
        }
    }

    /// Point-in-time snapshot for diagnostics
    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        BreakerSnapshot {
            target: self.target.clone(),
            state: self.state(),
            failure_count: inner.failure_count,
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
        }
    }

    /// Force circuit to the open state (emergency stop)
    pub async fn force_open(&self) {
        let mut inner = self.inner.lock().await;
        inner.last_failure = Some(Instant::now());
        self.set_state(CircuitState::Open);
        warn!(target_name = %self.target, "🚨 Circuit breaker forced open");
    }

    /// Force circuit to the closed state (emergency recovery)
    pub async fn force_closed(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count = 0;
        inner.last_failure = None;
        self.set_state(CircuitState::Closed);
        warn!(target_name = %self.target, "🚨 Circuit breaker forced closed");
    }
}
