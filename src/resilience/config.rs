//! # Resilience Configuration
//!
//! Configuration structures and validation for circuit breaker and fallback
//! behavior.

use crate::config::RetrySettings;
use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Time to wait in the open state before admitting a trial call
    pub reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Preset for the business-event webhook target
    pub fn for_webhook() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_THRESHOLD,
            reset_timeout: Duration::from_millis(defaults::BREAKER_RESET_TIMEOUT_MS),
        }
    }

    /// Preset for the log upload sink; trips earlier since log batches are
    /// requeued anyway
    pub fn for_log_sink() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }
        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }
        if self.reset_timeout.is_zero() {
            return Err("reset_timeout must be greater than 0".to_string());
        }
        if self.reset_timeout > Duration::from_secs(600) {
            return Err("reset_timeout should not exceed 600 seconds".to_string());
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::for_webhook()
    }
}

/// Combined knobs consulted by the fallback orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Total attempts for the retry strategy, first try included
    pub max_retries: u32,
    /// Base backoff delay; doubles after each failed attempt
    pub base_delay: Duration,
    pub breaker_threshold: u32,
    pub breaker_reset_timeout: Duration,
    /// Per-call fallback switch; the environment policy can still veto
    pub fallbacks_enabled: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            base_delay: Duration::from_millis(defaults::BASE_DELAY_MS),
            breaker_threshold: defaults::BREAKER_THRESHOLD,
            breaker_reset_timeout: Duration::from_millis(defaults::BREAKER_RESET_TIMEOUT_MS),
            fallbacks_enabled: true,
        }
    }
}

impl ResilienceConfig {
    /// Derive resilience knobs from the pipeline's retry settings
    pub fn from_retry_settings(retry: &RetrySettings) -> Self {
        Self {
            max_retries: retry.max_retries.max(1),
            base_delay: Duration::from_millis(retry.base_delay_ms),
            ..Self::default()
        }
    }

    /// The breaker slice of this configuration
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_threshold,
            reset_timeout: self.breaker_reset_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("max_retries must be greater than 0".to_string());
        }
        self.breaker_config().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let invalid = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = CircuitBreakerConfig {
            reset_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_preset_configurations() {
        let webhook = CircuitBreakerConfig::for_webhook();
        assert_eq!(webhook.failure_threshold, 5);
        assert!(webhook.validate().is_ok());

        let log_sink = CircuitBreakerConfig::for_log_sink();
        assert_eq!(log_sink.failure_threshold, 3);
        assert!(log_sink.validate().is_ok());
    }

    #[test]
    fn test_resilience_config_from_retry_settings() {
        let config = ResilienceConfig::from_retry_settings(&RetrySettings {
            max_retries: 5,
            base_delay_ms: 250,
        });
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert!(config.fallbacks_enabled);
        assert!(config.validate().is_ok());
    }
}
