//! # Circuit Breaker Manager
//!
//! One lazily-created breaker per delivery target, behind a shared registry.
//! Callers never mutate breaker state directly; they obtain a breaker and run
//! operations through its `execute`.

use crate::resilience::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Registry of circuit breakers keyed by target name
#[derive(Debug)]
pub struct CircuitBreakerManager {
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            default_config,
        }
    }

    /// Get or lazily create the breaker for a target, using the manager's
    /// default configuration
    pub async fn get_or_create(&self, target: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(target, self.default_config.clone())
            .await
    }

    /// Get or lazily create the breaker for a target with an explicit
    /// configuration; an existing breaker keeps its original configuration
    pub async fn get_or_create_with(
        &self,
        target: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(target) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.breakers.write().await;

        // Double-check: another task may have created it between locks
        if let Some(breaker) = breakers.get(target) {
            return Arc::clone(breaker);
        }

        let breaker = Arc::new(CircuitBreaker::new(target.to_string(), config));
        breakers.insert(target.to_string(), Arc::clone(&breaker));

        info!(
            target_name = %target,
            total_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Names of all registered targets
    pub async fn list_targets(&self) -> Vec<String> {
        self.breakers.read().await.keys().cloned().collect()
    }

    /// Snapshots of every registered breaker, for diagnostics
    pub async fn snapshot_all(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.read().await;
        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers.values() {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots
    }

    /// Remove the breaker for a target; returns false for unknown targets
    pub async fn remove(&self, target: &str) -> bool {
        self.breakers.write().await.remove(target).is_some()
    }
}

impl Clone for CircuitBreakerManager {
    fn clone(&self) -> Self {
        Self {
            breakers: Arc::clone(&self.breakers),
            default_config: self.default_config.clone(),
        }
    }
}
