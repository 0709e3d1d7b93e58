//! # Resilient Delivery Wrapper
//!
//! Composes any [`Delivery`] implementation with the fallback orchestration
//! layer. Events run behind the webhook target's circuit breaker; log batches
//! behind the log sink's. An open circuit degrades a send to a fast drop
//! instead of surfacing an error to the caller.

use crate::delivery::Delivery;
use crate::error::{PipelineError, Result};
use crate::events::Event;
use crate::logging::LogBatchPayload;
use crate::resilience::{
    FallbackOptions, FallbackOrchestrator, FallbackStrategy, ResilienceConfig,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Target names used for breaker registry lookup
const WEBHOOK_TARGET: &str = "webhook";
const LOG_SINK_TARGET: &str = "log-sink";

pub struct ResilientDelivery {
    inner: Arc<dyn Delivery>,
    orchestrator: Arc<FallbackOrchestrator>,
    config: ResilienceConfig,
}

impl ResilientDelivery {
    pub fn new(
        inner: Arc<dyn Delivery>,
        orchestrator: Arc<FallbackOrchestrator>,
        config: ResilienceConfig,
    ) -> Self {
        Self {
            inner,
            orchestrator,
            config,
        }
    }

    /// Run a send under the named target's circuit breaker. `Ok(false)` from
    /// the inner client (attempts exhausted) counts as a breaker failure;
    /// an open circuit maps back to a quiet `Ok(false)` for the caller.
    async fn guarded_send<F, Fut>(&self, target: &str, send: F) -> Result<bool>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<bool>> + Send,
    {
        let options: FallbackOptions<bool> =
            FallbackOptions::new(FallbackStrategy::CircuitBreaker)
                .with_config(self.config.clone());

        let outcome = self
            .orchestrator
            .execute_with_fallback(target, || async {
                match send().await {
                    Ok(true) => Ok(true),
                    Ok(false) => Err(PipelineError::transport("delivery exhausted all attempts")),
                    Err(e) => Err(e),
                }
            }, options)
            .await;

        match outcome {
            Ok(delivered) => Ok(delivered),
            Err(PipelineError::Capacity { target }) => {
                debug!(target_name = %target, "Circuit open, dropping send without an attempt");
                Ok(false)
            }
            Err(PipelineError::Transport { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Delivery for ResilientDelivery {
    async fn send_event(&self, url: &str, event: &Event) -> Result<bool> {
        self.guarded_send(WEBHOOK_TARGET, || self.inner.send_event(url, event))
            .await
    }

    async fn send_log_batch(&self, url: &str, batch: &LogBatchPayload) -> Result<bool> {
        self.guarded_send(LOG_SINK_TARGET, || self.inner.send_log_batch(url, batch))
            .await
    }

    async fn send_final(&self, url: &str, batch: &LogBatchPayload) {
        // Teardown path bypasses resilience entirely; it is explicitly lossy
        self.inner.send_final(url, batch).await;
    }
}
