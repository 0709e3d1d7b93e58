//! # Fallback Orchestrator
//!
//! Wraps an arbitrary operation with a chosen resilience strategy, consulting
//! the environment policy. Whatever the strategy, a supplied fallback value
//! or function is the last resort before the original error is returned.

use crate::config::EnvironmentPolicy;
use crate::delivery::client::backoff_delay;
use crate::error::{PipelineError, Result};
use crate::resilience::{
    CircuitBreakerError, CircuitBreakerManager, ResilienceConfig,
};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resilience strategy applied to the primary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Single attempt; errors propagate (subject to last-resort fallback)
    Immediate,
    /// Bounded retries with exponential backoff; no shared state across
    /// services
    Retry,
    /// Delegate to the named target's circuit breaker
    CircuitBreaker,
    /// Try once; on any failure return the fallback's result, surfacing only
    /// a warning
    GracefulDegradation,
}

/// Deferred fallback operation
pub type FallbackFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Per-call options for [`FallbackOrchestrator::execute_with_fallback`]
pub struct FallbackOptions<T> {
    pub strategy: FallbackStrategy,
    pub config: ResilienceConfig,
    pub fallback_value: Option<T>,
    pub fallback_fn: Option<FallbackFn<T>>,
}

impl<T> FallbackOptions<T> {
    pub fn new(strategy: FallbackStrategy) -> Self {
        Self {
            strategy,
            config: ResilienceConfig::default(),
            fallback_value: None,
            fallback_fn: None,
        }
    }

    pub fn with_config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fallback_value(mut self, value: T) -> Self {
        self.fallback_value = Some(value);
        self
    }

    pub fn with_fallback_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    {
        self.fallback_fn = Some(Arc::new(f));
        self
    }
}

/// Composes the circuit breaker primitive with retry and degradation policy
pub struct FallbackOrchestrator {
    policy: Arc<EnvironmentPolicy>,
    breakers: Arc<CircuitBreakerManager>,
}

impl FallbackOrchestrator {
    pub fn new(policy: Arc<EnvironmentPolicy>, breakers: Arc<CircuitBreakerManager>) -> Self {
        Self { policy, breakers }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    /// Run `primary` under the selected strategy for the named service.
    ///
    /// When the environment policy (or the per-call config) disables
    /// fallbacks, the primary runs directly and its errors propagate
    /// untouched.
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        service: &str,
        primary: F,
        mut options: FallbackOptions<T>,
    ) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        if !self.policy.fallbacks_enabled() || !options.config.fallbacks_enabled {
            debug!(service = %service, "Fallbacks disabled, running primary directly");
            return primary().await;
        }

        let outcome = match options.strategy {
            FallbackStrategy::Immediate => primary().await,
            FallbackStrategy::GracefulDegradation => primary().await,
            FallbackStrategy::Retry => {
                self.run_with_retry(service, &primary, &options.config).await
            }
            FallbackStrategy::CircuitBreaker => {
                let breaker = self
                    .breakers
                    .get_or_create_with(service, options.config.breaker_config())
                    .await;
                match breaker.execute(|| primary()).await {
                    Ok(value) => Ok(value),
                    Err(CircuitBreakerError::CircuitOpen { target }) => {
                        Err(PipelineError::Capacity { target })
                    }
                    Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
                }
            }
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        // Last resort: a supplied fallback absorbs the failure
        if let Some(fallback) = options.fallback_fn.take() {
            warn!(
                service = %service,
                error = %error,
                "Primary operation failed, using fallback function"
            );
            return fallback().await;
        }
        if let Some(value) = options.fallback_value.take() {
            warn!(
                service = %service,
                error = %error,
                "Primary operation failed, using fallback value"
            );
            return Ok(value);
        }

        Err(error)
    }

    /// Bounded retry with exponential backoff, keeping the last error
    async fn run_with_retry<T, F, Fut>(
        &self,
        service: &str,
        primary: &F,
        config: &ResilienceConfig,
    ) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let max = config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=max {
            match primary().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        service = %service,
                        attempt = attempt,
                        max_attempts = max,
                        error = %e,
                        "Retry attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < max {
                        tokio::time::sleep(backoff_delay(config.base_delay, attempt)).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PipelineError::transport("retry loop made no attempts")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::resilience::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn orchestrator() -> FallbackOrchestrator {
        FallbackOrchestrator::new(
            Arc::new(EnvironmentPolicy::new(Environment::Development)),
            Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig::default())),
        )
    }

    fn fast_config() -> ResilienceConfig {
        ResilienceConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            breaker_threshold: 2,
            breaker_reset_timeout: Duration::from_secs(60),
            fallbacks_enabled: true,
        }
    }

    #[tokio::test]
    async fn test_immediate_strategy_propagates_error() {
        let orch = orchestrator();
        let result: Result<u32> = orch
            .execute_with_fallback(
                "svc",
                || async { Err(PipelineError::transport("down")) },
                FallbackOptions::new(FallbackStrategy::Immediate).with_config(fast_config()),
            )
            .await;
        assert!(matches!(result, Err(PipelineError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_retry_strategy_eventually_succeeds() {
        let orch = orchestrator();
        let calls = AtomicU32::new(0);

        let result = orch
            .execute_with_fallback(
                "svc",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(PipelineError::transport("flaky"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                FallbackOptions::new(FallbackStrategy::Retry).with_config(fast_config()),
            )
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_strategy_exhausts_to_original_error() {
        let orch = orchestrator();
        let calls = AtomicU32::new(0);

        let result: Result<u32> = orch
            .execute_with_fallback(
                "svc",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(PipelineError::transport("always down")) }
                },
                FallbackOptions::new(FallbackStrategy::Retry).with_config(fast_config()),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_graceful_degradation_returns_fallback_fn_result() {
        let orch = orchestrator();

        let result = orch
            .execute_with_fallback(
                "svc",
                || async { Err(PipelineError::transport("always down")) },
                FallbackOptions::new(FallbackStrategy::GracefulDegradation)
                    .with_config(fast_config())
                    .with_fallback_fn(|| Box::pin(async { Ok("cached".to_string()) })),
            )
            .await
            .unwrap();

        assert_eq!(result, "cached");
    }

    #[tokio::test]
    async fn test_fallback_value_as_last_resort_after_retry() {
        let orch = orchestrator();

        let result = orch
            .execute_with_fallback(
                "svc",
                || async { Err(PipelineError::transport("always down")) },
                FallbackOptions::new(FallbackStrategy::Retry)
                    .with_config(fast_config())
                    .with_fallback_value(7u32),
            )
            .await
            .unwrap();

        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn test_circuit_breaker_strategy_fails_fast_when_open() {
        let orch = orchestrator();
        let calls = AtomicU32::new(0);

        // Two failures trip the breaker (threshold 2)
        for _ in 0..2 {
            let _: Result<u32> = orch
                .execute_with_fallback(
                    "cb-svc",
                    || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async { Err(PipelineError::transport("down")) }
                    },
                    FallbackOptions::new(FallbackStrategy::CircuitBreaker)
                        .with_config(fast_config()),
                )
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Third call is rejected without invoking the operation
        let result: Result<u32> = orch
            .execute_with_fallback(
                "cb-svc",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(1) }
                },
                FallbackOptions::new(FallbackStrategy::CircuitBreaker).with_config(fast_config()),
            )
            .await;

        assert!(matches!(result, Err(PipelineError::Capacity { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_fallbacks_bypass_orchestration() {
        let orch = orchestrator();
        let mut config = fast_config();
        config.fallbacks_enabled = false;

        // Fallback value supplied but ignored: the error propagates
        let result: Result<u32> = orch
            .execute_with_fallback(
                "svc",
                || async { Err(PipelineError::transport("down")) },
                FallbackOptions::new(FallbackStrategy::Retry)
                    .with_config(config)
                    .with_fallback_value(9),
            )
            .await;

        assert!(matches!(result, Err(PipelineError::Transport { .. })));
    }
}
