//! # Delivery Layer
//!
//! One seam for everything that leaves the process over HTTP. The
//! [`Delivery`] trait is what the dispatcher and the log uploader depend on;
//! [`DeliveryClient`] is the real reqwest-backed implementation and
//! [`ResilientDelivery`] wraps any implementation with the fallback
//! orchestration layer.

pub mod client;
pub mod resilient;

use crate::error::Result;
use crate::events::Event;
use crate::logging::LogBatchPayload;
use async_trait::async_trait;

pub use client::{ConnectionTestOutcome, DeliveryAck, DeliveryClient, DeliveryClientConfig};
pub use resilient::ResilientDelivery;

/// Outbound delivery seam. Implementations own their retry policy; callers
/// treat `Ok(false)` as "attempts exhausted, nothing more to do here".
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver one event. `Ok(true)` on the first successful attempt,
    /// `Ok(false)` once all attempts are exhausted.
    async fn send_event(&self, url: &str, event: &Event) -> Result<bool>;

    /// Deliver one log batch with the same retry semantics as events
    async fn send_log_batch(&self, url: &str, batch: &LogBatchPayload) -> Result<bool>;

    /// Best-effort single attempt used during teardown. Never retries, never
    /// fails the caller; an unreachable sink simply loses this send.
    async fn send_final(&self, url: &str, batch: &LogBatchPayload);
}
