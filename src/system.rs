//! # Pipeline System
//!
//! Composition root wiring the whole pipeline together: explicitly
//! constructed, injected service objects instead of hidden global state.
//! Holding a [`PipelineSystem`] gives business code its only two entry
//! points, triggering named domain events and logging at a severity, plus
//! lifecycle control and diagnostics.

use crate::config::{
    CachedSettings, Environment, EnvironmentPolicy, SettingsProvider, ValidationReport,
};
use crate::constants::defaults;
use crate::delivery::{DeliveryClient, DeliveryClientConfig, ResilientDelivery};
use crate::error::Result;
use crate::events::{EventDispatcher, RouteTable};
use crate::logging::{DurableLogStore, LogBatchUploader, LogCapture, StorageStats};
use crate::resilience::{
    BreakerSnapshot, CircuitBreakerManager, FallbackOrchestrator, ResilienceConfig,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// Construction-time knobs for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSystemConfig {
    /// SQLite URL for the durable log store
    pub database_url: String,
    pub environment: Environment,
    /// Explicit mock-mode override (honored in development only)
    pub mock_override: Option<bool>,
    pub flush_interval: Duration,
    /// Age past which synced log entries become eligible for deletion
    pub log_retention: Duration,
}

impl Default for PipelineSystemConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://studyflow-logs.db".to_string(),
            environment: Environment::detect(),
            mock_override: None,
            flush_interval: Duration::from_secs(defaults::FLUSH_INTERVAL_SECS),
            log_retention: Duration::from_secs(defaults::LOG_RETENTION_SECS),
        }
    }
}

pub struct PipelineSystem {
    settings: Arc<CachedSettings>,
    policy: Arc<EnvironmentPolicy>,
    dispatcher: EventDispatcher,
    capture: LogCapture,
    uploader: Arc<LogBatchUploader>,
    store: Arc<DurableLogStore>,
    breakers: Arc<CircuitBreakerManager>,
    config: PipelineSystemConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    uploader_task: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineSystem {
    /// Wire the full pipeline from a settings provider. No background work
    /// starts until [`start`](Self::start).
    pub fn bootstrap(
        provider: Arc<dyn SettingsProvider>,
        config: PipelineSystemConfig,
    ) -> Result<Self> {
        let initial = provider.load()?;
        let settings = Arc::new(CachedSettings::new(provider, initial.cache_ttl()));

        let mut policy = EnvironmentPolicy::new(config.environment);
        if let Some(mock) = config.mock_override {
            policy = policy.with_mock_override(mock);
        }
        let policy = Arc::new(policy);

        let resilience = ResilienceConfig::from_retry_settings(&initial.retry);
        let breakers = Arc::new(CircuitBreakerManager::new(resilience.breaker_config()));
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            Arc::clone(&policy),
            Arc::clone(&breakers),
        ));

        let client = Arc::new(DeliveryClient::new(DeliveryClientConfig::from_retry_settings(
            &initial.retry,
        ))?);
        let delivery = Arc::new(ResilientDelivery::new(client, orchestrator, resilience));

        let store = Arc::new(DurableLogStore::new(config.database_url.clone()));
        let session_id = Uuid::new_v4().to_string();
        let uploader = Arc::new(LogBatchUploader::new(
            Arc::clone(&store),
            delivery.clone(),
            Arc::clone(&settings),
            session_id,
            config.environment,
            config.flush_interval,
        ));
        let capture = LogCapture::new(Arc::clone(&store), Arc::clone(&uploader));

        let dispatcher = EventDispatcher::new(
            Arc::clone(&settings),
            Arc::new(RouteTable::with_default_routes()),
            delivery,
            Arc::clone(&policy),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            settings,
            policy,
            dispatcher,
            capture,
            uploader,
            store,
            breakers,
            config,
            shutdown_tx,
            shutdown_rx,
            uploader_task: Mutex::new(None),
        })
    }

    /// Initialize durable storage, recover unsynced entries from previous
    /// sessions, run retention cleanup, and start the periodic uploader
    pub async fn start(&self) -> Result<()> {
        self.store.initialize().await?;
        let recovered = self.uploader.load_persisted().await?;
        let cleaned = self.store.cleanup_old_logs(self.config.log_retention).await?;

        let handle = tokio::spawn(Arc::clone(&self.uploader).run(self.shutdown_rx.clone()));
        *self.uploader_task.lock() = Some(handle);

        info!(
            environment = self.policy.environment().as_str(),
            recovered_logs = recovered,
            cleaned_logs = cleaned,
            "🚀 Delivery pipeline started"
        );
        Ok(())
    }

    /// Stop periodic flushing. The uploader attempts one lossy final send;
    /// anything it cannot deliver stays unsynced in the durable store.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.uploader_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Delivery pipeline stopped");
    }

    /// Attach identity to subsequent log entries and batch payloads
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.capture.set_user_id(user_id);
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn logs(&self) -> &LogCapture {
        &self.capture
    }

    pub fn settings(&self) -> &Arc<CachedSettings> {
        &self.settings
    }

    pub fn policy(&self) -> &Arc<EnvironmentPolicy> {
        &self.policy
    }

    /// Validate the current settings against the active environment
    pub fn validate_configuration(&self) -> Result<ValidationReport> {
        let settings = self.settings.current()?;
        Ok(self.policy.validate_configuration(&settings))
    }

    pub async fn storage_stats(&self) -> Result<StorageStats> {
        self.store.get_storage_stats().await
    }

    pub async fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshot_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemorySettingsProvider, PipelineSettings};
    use crate::logging::LogLevel;

    fn test_config() -> PipelineSystemConfig {
        PipelineSystemConfig {
            database_url: "sqlite::memory:".to_string(),
            environment: Environment::Development,
            mock_override: None,
            flush_interval: Duration::from_secs(300),
            log_retention: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_start_and_shutdown() {
        let system = PipelineSystem::bootstrap(
            Arc::new(MemorySettingsProvider::new(PipelineSettings::default())),
            test_config(),
        )
        .unwrap();

        system.start().await.unwrap();
        system.set_user_id("42");
        system.logs().log(LogLevel::Info, "hello", None);

        // Mock mode in development: events report success without network
        assert!(system.dispatcher().on_lesson_completed("42", 1, 1).await);

        // Background persistence settles before we read stats
        tokio::time::sleep(Duration::from_millis(50)).await;
        system.shutdown().await;
        assert!(system.storage_stats().await.unwrap().total >= 1);
    }

    #[tokio::test]
    async fn test_validate_configuration_reflects_environment() {
        let system = PipelineSystem::bootstrap(
            Arc::new(MemorySettingsProvider::new(PipelineSettings::default())),
            test_config(),
        )
        .unwrap();

        let report = system.validate_configuration().unwrap();
        assert!(report.is_valid);
        assert!(!report.warnings.is_empty());
    }
}
