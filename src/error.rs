//! # Pipeline Error Taxonomy
//!
//! Structured errors for the delivery and logging pipeline. The taxonomy
//! mirrors how failures propagate: transport errors are retried locally before
//! surfacing, capacity errors short-circuit without an attempt, and
//! persistence errors on the logging path are demoted to diagnostics so a log
//! call can never crash application code.

use thiserror::Error;

/// All failure modes surfaced by the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid configuration (bad target URL, invalid mode).
    /// Raised synchronously from setters; never from the dispatch path once a
    /// configuration has been accepted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network failure or non-2xx response from a delivery target
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// HTTP status when the target responded at all
        status: Option<u16>,
    },

    /// Circuit breaker is open for the target; no attempt was made
    #[error("Circuit open for {target}, failing fast")]
    Capacity { target: String },

    /// Durable store unavailable or a transaction failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Malformed event or log entry
    #[error("Validation error: {0}")]
    Validation(String),
}

impl PipelineError {
    /// Transport failure without an HTTP status (connection-level)
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Transport failure carrying the responded HTTP status
    pub fn transport_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
        }
    }

    /// True when a bounded local retry is worthwhile
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(PipelineError::transport("connection refused").is_retryable());
        assert!(PipelineError::transport_status(503, "unavailable").is_retryable());
    }

    #[test]
    fn capacity_errors_short_circuit() {
        let err = PipelineError::Capacity {
            target: "webhook".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("failing fast"));
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        assert!(!PipelineError::Configuration("empty target".into()).is_retryable());
    }
}
