//! # Log Capture
//!
//! The log call sites' entry point. Capture is synchronous and infallible
//! from the caller's point of view: entries land in a bounded in-memory
//! buffer, are queued for upload, and are persisted in the background. A
//! persistence failure is reported to the process tracing sink only; it never
//! propagates back to the code that logged.

use crate::constants::defaults;
use crate::logging::entry::{LogEntry, LogLevel};
use crate::logging::store::DurableLogStore;
use crate::logging::uploader::LogBatchUploader;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

pub struct LogCapture {
    /// Bounded recent-entry buffer; oldest entries are dropped from memory
    /// only, the durable store keeps them until synced
    buffer: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    session_id: String,
    user_id: RwLock<Option<String>>,
    /// Coarse context tag (current screen/route) stamped onto entries
    route_tag: RwLock<String>,
    store: Arc<DurableLogStore>,
    uploader: Arc<LogBatchUploader>,
}

impl LogCapture {
    pub fn new(store: Arc<DurableLogStore>, uploader: Arc<LogBatchUploader>) -> Self {
        Self::with_capacity(store, uploader, defaults::LOG_BUFFER_CAPACITY)
    }

    pub fn with_capacity(
        store: Arc<DurableLogStore>,
        uploader: Arc<LogBatchUploader>,
        capacity: usize,
    ) -> Self {
        // One session per process: entries carry the same id as the batch
        // payloads that deliver them
        let session_id = uploader.session_id().to_string();
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            session_id,
            user_id: RwLock::new(None),
            route_tag: RwLock::new("root".to_string()),
            store,
            uploader,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Attach identity to all subsequent entries for the process lifetime
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        *self.user_id.write() = Some(user_id.clone());
        self.uploader.set_user_id(Some(user_id));
    }

    /// Update the context tag stamped onto subsequent entries
    pub fn set_route_tag(&self, tag: impl Into<String>) {
        *self.route_tag.write() = tag.into();
    }

    /// Capture one entry. Error-level entries additionally trigger a prompt
    /// out-of-band flush, independent of the periodic timer.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, data: Option<Value>) {
        let entry = LogEntry::new(
            level,
            message,
            data,
            self.session_id.clone(),
            self.user_id.read().clone(),
            self.route_tag.read().clone(),
        );

        {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(entry.clone());
        }

        self.uploader.enqueue(entry.clone());

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.store_logs(&[entry]).await {
                // Logging must never crash application code
                warn!(error = %e, "Failed to persist log entry");
            }
        });

        if level == LogLevel::Error {
            self.uploader.request_flush();
        }
    }

    pub fn debug(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Debug, message, data);
    }

    pub fn info(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Info, message, data);
    }

    pub fn warn(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Warn, message, data);
    }

    pub fn error(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Error, message, data);
    }

    /// Snapshot of the in-memory buffer, oldest first
    pub fn buffered(&self) -> Vec<LogEntry> {
        self.buffer.lock().iter().cloned().collect()
    }
}
