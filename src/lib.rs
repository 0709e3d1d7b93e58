#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, reqwest in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # StudyFlow Core
//!
//! Resilient event-delivery and durable-logging pipeline for the StudyFlow
//! e-learning Mini App.
//!
//! ## Overview
//!
//! Business code gets exactly two entry points: trigger a named domain event,
//! or log at a severity. Everything behind those calls degrades to
//! best-effort (a dropped event, a deferred log) and never interrupts the
//! primary application flow.
//!
//! ## Architecture
//!
//! Leaf-first composition:
//!
//! - [`resilience`] - circuit breaker primitive plus fallback orchestration
//! - [`delivery`] - HTTP delivery client with bounded retries and backoff
//! - [`events`] - domain events, trigger routes, and the dispatcher
//! - [`logging`] - log capture, SQLite-backed durable store, batch uploader
//! - [`config`] - TTL-cached settings and the environment policy
//! - [`system`] - composition root wiring the above together
//!
//! ## Delivery Guarantees
//!
//! - **Events**: fire-and-forget. Delivered within the current call (bounded
//!   retries, circuit breaker) or dropped, never queued.
//! - **Logs**: at-least-once. Persisted locally with a synced flag before
//!   upload; a failed batch is requeued and survives process restarts. An
//!   entry is never deleted while unsynced.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use studyflow_core::config::EnvSettingsProvider;
//! use studyflow_core::system::{PipelineSystem, PipelineSystemConfig};
//!
//! # async fn example() -> studyflow_core::Result<()> {
//! let system = PipelineSystem::bootstrap(
//!     Arc::new(EnvSettingsProvider::new()),
//!     PipelineSystemConfig::default(),
//! )?;
//! system.start().await?;
//!
//! system.set_user_id("42");
//! system.logs().info("lesson opened", None);
//! system.dispatcher().on_lesson_completed("42", 7, 1).await;
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod delivery;
pub mod error;
pub mod events;
pub mod logging;
pub mod resilience;
pub mod system;
pub mod telemetry;

pub use error::{PipelineError, Result};
pub use system::{PipelineSystem, PipelineSystemConfig};
