//! # HTTP Delivery Client
//!
//! POSTs JSON payloads to webhook endpoints with bounded retries and
//! exponential backoff. Any non-2xx status or transport failure counts as a
//! failed attempt. The delay after failed attempt `n` is
//! `base_delay * 2^(n-1)`; the final failed attempt does not sleep.

use crate::config::RetrySettings;
use crate::constants::{defaults, event_types};
use crate::error::{PipelineError, Result};
use crate::events::Event;
use crate::logging::LogBatchPayload;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Optional acknowledgment body returned by the automation endpoint.
/// Its absence is not a failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryAck {
    pub message: Option<String>,
    pub workflow_id: Option<String>,
    pub execution_id: Option<String>,
}

/// Outcome of a diagnostic connection test
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTestOutcome {
    pub success: bool,
    pub error: Option<String>,
}

/// Configuration for the delivery client
#[derive(Debug, Clone)]
pub struct DeliveryClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Total attempts per delivery, first try included
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for DeliveryClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(defaults::HTTP_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(defaults::HTTP_CONNECT_TIMEOUT_SECS),
            max_retries: defaults::MAX_RETRIES,
            base_delay: Duration::from_millis(defaults::BASE_DELAY_MS),
        }
    }
}

impl DeliveryClientConfig {
    /// Derive client configuration from the pipeline's retry settings
    pub fn from_retry_settings(retry: &RetrySettings) -> Self {
        Self {
            max_retries: retry.max_retries.max(1),
            base_delay: Duration::from_millis(retry.base_delay_ms),
            ..Self::default()
        }
    }
}

/// Backoff delay after failed attempt `n` (1-based)
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// reqwest-backed webhook delivery client
pub struct DeliveryClient {
    client: Client,
    config: DeliveryClientConfig,
}

impl DeliveryClient {
    pub fn new(config: DeliveryClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DeliveryClientConfig {
        &self.config
    }

    /// One POST attempt. Non-2xx responses and transport failures both map to
    /// a transport error.
    async fn post_json(&self, url: &str, body: &Value) -> Result<DeliveryAck> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::transport(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::transport_status(
                status.as_u16(),
                format!("target returned {status}: {body}"),
            ));
        }

        // The acknowledgment body is optional; an empty or non-JSON response
        // is still a successful delivery.
        Ok(response.json::<DeliveryAck>().await.unwrap_or_default())
    }

    /// Bounded retry loop shared by event and log-batch delivery
    async fn send_with_retry(&self, url: &str, body: &Value) -> bool {
        let max = self.config.max_retries.max(1);
        for attempt in 1..=max {
            match self.post_json(url, body).await {
                Ok(ack) => {
                    debug!(
                        url = %url,
                        attempt = attempt,
                        workflow_id = ack.workflow_id.as_deref(),
                        "🟢 Delivery succeeded"
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        url = %url,
                        attempt = attempt,
                        max_attempts = max,
                        error = %e,
                        "Delivery attempt failed"
                    );
                    if attempt < max {
                        tokio::time::sleep(backoff_delay(self.config.base_delay, attempt)).await;
                    }
                }
            }
        }

        warn!(url = %url, attempts = max, "🔴 Delivery exhausted all attempts");
        false
    }

    /// Single diagnostic attempt with a synthetic event; never retried and
    /// never recorded as a domain event
    pub async fn test_connection(&self, url: &str) -> ConnectionTestOutcome {
        let probe = Event::new(event_types::CONNECTION_TEST, "test_user").with_data("test", true);
        let body = match serde_json::to_value(&probe) {
            Ok(v) => v,
            Err(e) => {
                return ConnectionTestOutcome {
                    success: false,
                    error: Some(format!("failed to serialize probe: {e}")),
                }
            }
        };

        match self.post_json(url, &body).await {
            Ok(_) => ConnectionTestOutcome {
                success: true,
                error: None,
            },
            Err(e) => ConnectionTestOutcome {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl super::Delivery for DeliveryClient {
    async fn send_event(&self, url: &str, event: &Event) -> Result<bool> {
        let body = serde_json::to_value(event)
            .map_err(|e| PipelineError::Validation(format!("unserializable event: {e}")))?;
        Ok(self.send_with_retry(url, &body).await)
    }

    async fn send_log_batch(&self, url: &str, batch: &LogBatchPayload) -> Result<bool> {
        let body = serde_json::to_value(batch)
            .map_err(|e| PipelineError::Validation(format!("unserializable log batch: {e}")))?;
        Ok(self.send_with_retry(url, &body).await)
    }

    async fn send_final(&self, url: &str, batch: &LogBatchPayload) {
        let Ok(body) = serde_json::to_value(batch) else {
            return;
        };
        match self.post_json(url, &body).await {
            Ok(_) => debug!(url = %url, count = batch.logs.len(), "Final log send delivered"),
            Err(e) => debug!(url = %url, error = %e, "Final log send lost (expected, lossy)"),
        }
    }
}
