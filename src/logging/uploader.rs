//! # Log Batch Uploader
//!
//! Periodic and severity-triggered flushing of pending log entries to the
//! remote sink. The pending queue is a live in-memory view; the durable store
//! is the source of truth, so a failed flush requeues its snapshot at the
//! front and nothing is lost. Flushes on one uploader are serialized by an
//! in-flight guard; a flush request arriving mid-flight is coalesced into one
//! follow-up pass rather than duplicated.

use crate::config::{CachedSettings, Environment};
use crate::constants::routes;
use crate::delivery::Delivery;
use crate::error::Result;
use crate::logging::entry::{LogBatchPayload, LogEntry};
use crate::logging::store::DurableLogStore;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct LogBatchUploader {
    pending: Mutex<VecDeque<LogEntry>>,
    /// In-flight guard; holding it means a flush pass is running
    flush_gate: tokio::sync::Mutex<()>,
    /// Set when a flush request arrives while the gate is held
    rerun_requested: AtomicBool,
    /// Out-of-band flush signal (error-severity entries, manual kicks)
    flush_notify: Notify,
    store: Arc<DurableLogStore>,
    delivery: Arc<dyn Delivery>,
    settings: Arc<CachedSettings>,
    session_id: String,
    user_id: RwLock<Option<String>>,
    environment: Environment,
    flush_interval: Duration,
}

impl LogBatchUploader {
    pub fn new(
        store: Arc<DurableLogStore>,
        delivery: Arc<dyn Delivery>,
        settings: Arc<CachedSettings>,
        session_id: impl Into<String>,
        environment: Environment,
        flush_interval: Duration,
    ) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            flush_gate: tokio::sync::Mutex::new(()),
            rerun_requested: AtomicBool::new(false),
            flush_notify: Notify::new(),
            store,
            delivery,
            settings,
            session_id: session_id.into(),
            user_id: RwLock::new(None),
            environment,
            flush_interval,
        }
    }

    /// Session id stamped onto batch payloads; capture adopts it so entries
    /// and the batches that carry them report the same session
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue one entry for the next flush
    pub fn enqueue(&self, entry: LogEntry) {
        self.pending.lock().push_back(entry);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Identity attached to subsequent batch payloads
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.user_id.write() = user_id;
    }

    /// Ask for a prompt out-of-band flush, independent of the periodic timer
    pub fn request_flush(&self) {
        self.flush_notify.notify_one();
    }

    /// Merge previously persisted unsynced entries ahead of anything already
    /// pending, so logs captured before a restart go out first
    pub async fn load_persisted(&self) -> Result<usize> {
        let recovered = self.store.get_unsynced_logs().await?;
        let count = recovered.len();
        if count > 0 {
            let mut pending = self.pending.lock();
            for entry in recovered.into_iter().rev() {
                pending.push_front(entry);
            }
            info!(count = count, "Recovered unsynced log entries from durable store");
        }
        Ok(count)
    }

    /// Flush the pending queue to the remote sink. A no-op when the queue is
    /// empty. When a flush is already running, this records a rerun request
    /// and returns; the running pass picks it up after its own batch.
    pub async fn flush(&self) -> Result<()> {
        let Ok(_gate) = self.flush_gate.try_lock() else {
            self.rerun_requested.store(true, Ordering::Release);
            debug!("Flush already in flight, coalescing request");
            return Ok(());
        };

        loop {
            self.flush_once().await?;
            if !self.rerun_requested.swap(false, Ordering::AcqRel) {
                break;
            }
        }
        Ok(())
    }

    async fn flush_once(&self) -> Result<()> {
        let snapshot: Vec<LogEntry> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };
        if snapshot.is_empty() {
            return Ok(());
        }

        let url = match self.sink_url()? {
            Some(url) => url,
            None => {
                debug!(
                    count = snapshot.len(),
                    "Log sink not configured, keeping batch pending"
                );
                self.requeue_front(snapshot);
                return Ok(());
            }
        };

        let batch = LogBatchPayload::new(
            snapshot.clone(),
            self.session_id.clone(),
            self.user_id.read().clone(),
            self.environment.as_str(),
        );

        match self.delivery.send_log_batch(&url, &batch).await {
            Ok(true) => {
                // The batch is already at the sink; a reconciliation failure
                // only risks a duplicate upload after the next restart
                match self.store.mark_logs_as_synced(&snapshot).await {
                    Ok(_) => {
                        debug!(count = snapshot.len(), "Log batch delivered and reconciled")
                    }
                    Err(e) => warn!(
                        count = snapshot.len(),
                        error = %e,
                        "Log batch delivered but entries could not be marked synced"
                    ),
                }
                Ok(())
            }
            Ok(false) => {
                warn!(
                    count = snapshot.len(),
                    "Log batch delivery exhausted attempts, requeuing"
                );
                self.requeue_front(snapshot);
                Ok(())
            }
            Err(e) => {
                warn!(
                    count = snapshot.len(),
                    error = %e,
                    "Log batch delivery failed, requeuing"
                );
                self.requeue_front(snapshot);
                Ok(())
            }
        }
    }

    fn requeue_front(&self, snapshot: Vec<LogEntry>) {
        let mut pending = self.pending.lock();
        for entry in snapshot.into_iter().rev() {
            pending.push_front(entry);
        }
    }

    fn sink_url(&self) -> Result<Option<String>> {
        let settings = self.settings.current()?;
        if settings.target_base_url.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(format!(
            "{}{}",
            settings.target_base_url.trim_end_matches('/'),
            routes::LOG_BATCH
        )))
    }

    /// Drive periodic flushing until the shutdown signal flips. Teardown
    /// attempts one final non-retrying send; an unreachable sink loses it,
    /// but the durable store still holds everything unsynced.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so startup recovery settles
        ticker.tick().await;

        info!(
            interval_secs = self.flush_interval.as_secs(),
            "Log batch uploader running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        warn!(error = %e, "Periodic log flush failed");
                    }
                }
                _ = self.flush_notify.notified() => {
                    if let Err(e) = self.flush().await {
                        warn!(error = %e, "Requested log flush failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.final_send().await;
                        info!("Log batch uploader stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Best-effort teardown send: single attempt, no retries, no store
    /// reconciliation. Entries stay unsynced locally and are recovered on
    /// the next startup.
    pub async fn final_send(&self) {
        let snapshot: Vec<LogEntry> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let url = match self.sink_url() {
            Ok(Some(url)) => url,
            _ => return,
        };

        let batch = LogBatchPayload::new(
            snapshot,
            self.session_id.clone(),
            self.user_id.read().clone(),
            self.environment.as_str(),
        );
        self.delivery.send_final(&url, &batch).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemorySettingsProvider, PipelineSettings};
    use crate::error::PipelineError;
    use crate::events::Event;
    use crate::logging::entry::LogLevel;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct ScriptedDelivery {
        calls: AtomicU32,
        succeed_from_call: u32,
    }

    #[async_trait]
    impl Delivery for ScriptedDelivery {
        async fn send_event(&self, _url: &str, _event: &Event) -> Result<bool> {
            Err(PipelineError::transport("not under test"))
        }

        async fn send_log_batch(&self, _url: &str, _batch: &LogBatchPayload) -> Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n >= self.succeed_from_call)
        }

        async fn send_final(&self, _url: &str, _batch: &LogBatchPayload) {}
    }

    fn settings(base_url: &str) -> Arc<CachedSettings> {
        Arc::new(CachedSettings::new(
            Arc::new(MemorySettingsProvider::new(PipelineSettings {
                target_base_url: base_url.to_string(),
                ..PipelineSettings::default()
            })),
            Duration::from_secs(60),
        ))
    }

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(LogLevel::Info, message, None, "s1", None, "root")
    }

    async fn uploader(
        base_url: &str,
        succeed_from_call: u32,
    ) -> (Arc<LogBatchUploader>, Arc<ScriptedDelivery>, Arc<DurableLogStore>) {
        let store = Arc::new(DurableLogStore::new("sqlite::memory:"));
        store.initialize().await.unwrap();
        let delivery = Arc::new(ScriptedDelivery {
            calls: AtomicU32::new(0),
            succeed_from_call,
        });
        let uploader = Arc::new(LogBatchUploader::new(
            store.clone(),
            delivery.clone(),
            settings(base_url),
            "s1",
            Environment::Development,
            Duration::from_secs(300),
        ));
        (uploader, delivery, store)
    }

    #[tokio::test]
    async fn test_flush_on_empty_queue_makes_no_network_call() {
        let (uploader, delivery, _store) = uploader("https://sink.example.com", 1).await;

        uploader.flush().await.unwrap();

        assert_eq!(delivery.calls.load(Ordering::SeqCst), 0);
        assert_eq!(uploader.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_successful_flush_marks_entries_synced() {
        let (uploader, delivery, store) = uploader("https://sink.example.com", 1).await;
        let entries = vec![entry("a"), entry("b")];
        store.store_logs(&entries).await.unwrap();
        for e in &entries {
            uploader.enqueue(e.clone());
        }

        uploader.flush().await.unwrap();

        assert_eq!(delivery.calls.load(Ordering::SeqCst), 1);
        assert_eq!(uploader.pending_count(), 0);
        assert!(store.get_unsynced_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_snapshot_in_order() {
        let (uploader, _delivery, store) = uploader("https://sink.example.com", 2).await;
        let entries = vec![entry("first"), entry("second")];
        store.store_logs(&entries).await.unwrap();
        for e in &entries {
            uploader.enqueue(e.clone());
        }

        // First flush fails; everything comes back in the original order
        uploader.flush().await.unwrap();
        assert_eq!(uploader.pending_count(), 2);
        assert_eq!(store.get_unsynced_logs().await.unwrap().len(), 2);

        // Second flush succeeds and reconciles the store
        uploader.flush().await.unwrap();
        assert_eq!(uploader.pending_count(), 0);
        assert!(store.get_unsynced_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_sink_keeps_batch_pending() {
        let (uploader, delivery, _store) = uploader("", 1).await;
        uploader.enqueue(entry("stuck"));

        uploader.flush().await.unwrap();

        assert_eq!(delivery.calls.load(Ordering::SeqCst), 0);
        assert_eq!(uploader.pending_count(), 1);
    }

    struct GatedDelivery {
        /// Messages per delivered batch, in delivery order
        batches: parking_lot::Mutex<Vec<Vec<String>>>,
        entered: Notify,
        release: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl Delivery for GatedDelivery {
        async fn send_event(&self, _url: &str, _event: &Event) -> Result<bool> {
            Err(PipelineError::transport("not under test"))
        }

        async fn send_log_batch(&self, _url: &str, batch: &LogBatchPayload) -> Result<bool> {
            self.batches
                .lock()
                .push(batch.logs.iter().map(|e| e.message.clone()).collect());
            self.entered.notify_one();
            self.release.acquire().await.unwrap().forget();
            Ok(true)
        }

        async fn send_final(&self, _url: &str, _batch: &LogBatchPayload) {}
    }

    #[tokio::test]
    async fn test_mid_flight_flush_is_coalesced_into_one_follow_up() {
        let store = Arc::new(DurableLogStore::new("sqlite::memory:"));
        store.initialize().await.unwrap();
        let delivery = Arc::new(GatedDelivery {
            batches: parking_lot::Mutex::new(Vec::new()),
            entered: Notify::new(),
            release: tokio::sync::Semaphore::new(0),
        });
        let uploader = Arc::new(LogBatchUploader::new(
            store.clone(),
            delivery.clone(),
            settings("https://sink.example.com"),
            "s1",
            Environment::Development,
            Duration::from_secs(300),
        ));

        let first = entry("first");
        store.store_logs(&[first.clone()]).await.unwrap();
        uploader.enqueue(first);

        let flusher = {
            let uploader = Arc::clone(&uploader);
            tokio::spawn(async move { uploader.flush().await })
        };
        // First batch is now blocked inside the sink
        delivery.entered.notified().await;

        // Mid-flight arrivals: one more entry and two more flush requests
        let second = entry("second");
        store.store_logs(&[second.clone()]).await.unwrap();
        uploader.enqueue(second);
        uploader.flush().await.unwrap();
        uploader.flush().await.unwrap();
        assert_eq!(delivery.batches.lock().len(), 1);

        delivery.release.add_permits(2);
        flusher.await.unwrap().unwrap();

        // Exactly one follow-up pass, nothing duplicated or lost
        let batches = delivery.batches.lock().clone();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec!["first".to_string()]);
        assert_eq!(batches[1], vec!["second".to_string()]);
        assert_eq!(uploader.pending_count(), 0);
        assert!(store.get_unsynced_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconciliation_failure_does_not_fail_the_flush() {
        // A store that cannot open its database: delivery succeeds, marking
        // entries synced fails
        let store = Arc::new(DurableLogStore::new(
            "sqlite:///nonexistent-studyflow-dir/logs.db",
        ));
        let delivery = Arc::new(ScriptedDelivery {
            calls: AtomicU32::new(0),
            succeed_from_call: 1,
        });
        let uploader = LogBatchUploader::new(
            store,
            delivery.clone(),
            settings("https://sink.example.com"),
            "s1",
            Environment::Development,
            Duration::from_secs(300),
        );

        uploader.enqueue(entry("delivered anyway"));
        uploader.flush().await.unwrap();

        assert_eq!(delivery.calls.load(Ordering::SeqCst), 1);
        // Delivered batches are not requeued even when marking synced fails
        assert_eq!(uploader.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_load_persisted_merges_recovered_entries_first() {
        let (uploader, _delivery, store) = uploader("https://sink.example.com", 1).await;

        let mut recovered = entry("from last session");
        recovered.timestamp = chrono::Utc::now() - chrono::Duration::hours(1);
        store.store_logs(&[recovered]).await.unwrap();

        uploader.enqueue(entry("fresh"));
        let count = uploader.load_persisted().await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(uploader.pending_count(), 2);
        let front = uploader.pending.lock().front().cloned().unwrap();
        assert_eq!(front.message, "from last session");
    }
}
