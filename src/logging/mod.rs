//! # Durable Logging Pipeline
//!
//! Capture, persist, and reliably upload structured diagnostic logs:
//!
//! - [`LogCapture`] - call-site entry point; buffers and schedules persistence
//! - [`DurableLogStore`] - SQLite queue with a per-entry synced flag
//! - [`LogBatchUploader`] - periodic/forced flushing with store reconciliation
//!
//! The pipeline is at-least-once: an entry can be uploaded twice after a
//! partial failure, but it is never lost before the remote sink acknowledges
//! it.

pub mod capture;
pub mod entry;
pub mod store;
pub mod uploader;

pub use capture::LogCapture;
pub use entry::{LogBatchPayload, LogEntry, LogLevel};
pub use store::{DurableLogStore, StorageStats};
pub use uploader::LogBatchUploader;
