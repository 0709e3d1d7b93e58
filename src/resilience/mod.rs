//! # Resilience Layer
//!
//! Fault isolation for outbound delivery. Two composable abstractions share
//! this module: the [`CircuitBreaker`] is a reusable primitive that stops
//! calling a failing dependency for a cooldown period, and the
//! [`FallbackOrchestrator`] composes it with retry and graceful-degradation
//! policy. Each is independently testable.

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod orchestrator;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::{CircuitBreakerConfig, ResilienceConfig};
pub use manager::CircuitBreakerManager;
pub use orchestrator::{FallbackFn, FallbackOptions, FallbackOrchestrator, FallbackStrategy};
