//! # Pipeline Configuration
//!
//! Explicit, validated configuration for the delivery pipeline. Settings are
//! owned by an external collaborator behind [`SettingsProvider`]; the pipeline
//! reads them through [`CachedSettings`], a TTL cache that is invalidated on
//! every setter call. A setter rejecting invalid input surfaces a
//! configuration error synchronously; an accepted configuration never causes
//! the dispatch path itself to fail.

pub mod environment;

use crate::constants::defaults;
use crate::error::{PipelineError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use environment::{Environment, EnvironmentPolicy, ValidationReport};

/// Retry behavior shared by the delivery client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per delivery, first try included
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; doubles after each failed attempt
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            base_delay_ms: defaults::BASE_DELAY_MS,
        }
    }
}

/// Pipeline settings as supplied by the settings collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Base URL all route paths are joined onto; empty means unconfigured
    pub target_base_url: String,
    /// Global dispatch switch; disabled events are dropped, never queued
    pub enabled: bool,
    pub retry: RetrySettings,
    /// TTL for cached settings reads, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_base_url: String::new(),
            enabled: true,
            retry: RetrySettings::default(),
            cache_ttl_secs: defaults::SETTINGS_CACHE_TTL_SECS,
        }
    }
}

impl PipelineSettings {
    /// Load settings from `STUDYFLOW__*` environment variables, falling back
    /// to defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .set_default("target_base_url", "")
            .and_then(|b| b.set_default("enabled", true))
            .and_then(|b| b.set_default("retry.max_retries", i64::from(defaults::MAX_RETRIES)))
            .and_then(|b| {
                b.set_default(
                    "retry.base_delay_ms",
                    i64::try_from(defaults::BASE_DELAY_MS).unwrap_or(1_000),
                )
            })
            .and_then(|b| {
                b.set_default(
                    "cache_ttl_secs",
                    i64::try_from(defaults::SETTINGS_CACHE_TTL_SECS).unwrap_or(60),
                )
            })
            .map_err(|e| PipelineError::Configuration(e.to_string()))?
            .add_source(config::Environment::with_prefix("STUDYFLOW").separator("__"))
            .build()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        cfg.try_deserialize()
            .map_err(|e| PipelineError::Configuration(e.to_string()))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Validate a candidate target base URL before accepting it
fn validate_target_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(PipelineError::Configuration(
            "target base URL must not be empty".to_string(),
        ));
    }
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| PipelineError::Configuration(format!("invalid target base URL: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(PipelineError::Configuration(format!(
            "target base URL must be http(s), got '{}'",
            parsed.scheme()
        )));
    }
    Ok(())
}

/// Source of truth for pipeline settings (external settings collaborator)
pub trait SettingsProvider: Send + Sync {
    fn load(&self) -> Result<PipelineSettings>;
    fn save(&self, settings: &PipelineSettings) -> Result<()>;
}

/// Environment-backed provider; runtime mutations live in process memory,
/// mirroring how the Mini App keeps operator changes local to a session
#[derive(Default)]
pub struct EnvSettingsProvider {
    runtime: RwLock<Option<PipelineSettings>>,
}

impl EnvSettingsProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsProvider for EnvSettingsProvider {
    fn load(&self) -> Result<PipelineSettings> {
        if let Some(settings) = self.runtime.read().as_ref() {
            return Ok(settings.clone());
        }
        PipelineSettings::from_env()
    }

    fn save(&self, settings: &PipelineSettings) -> Result<()> {
        *self.runtime.write() = Some(settings.clone());
        Ok(())
    }
}

/// Fixed in-memory provider, used by tests and the mock environment
pub struct MemorySettingsProvider {
    settings: RwLock<PipelineSettings>,
}

impl MemorySettingsProvider {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

impl SettingsProvider for MemorySettingsProvider {
    fn load(&self) -> Result<PipelineSettings> {
        Ok(self.settings.read().clone())
    }

    fn save(&self, settings: &PipelineSettings) -> Result<()> {
        *self.settings.write() = settings.clone();
        Ok(())
    }
}

struct CacheSlot {
    settings: PipelineSettings,
    loaded_at: Instant,
}

/// TTL cache over a [`SettingsProvider`], invalidated by every setter
pub struct CachedSettings {
    provider: Arc<dyn SettingsProvider>,
    ttl: Duration,
    cache: RwLock<Option<CacheSlot>>,
}

impl CachedSettings {
    pub fn new(provider: Arc<dyn SettingsProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Current settings, served from cache while the TTL holds
    pub fn current(&self) -> Result<PipelineSettings> {
        {
            let cache = self.cache.read();
            if let Some(slot) = cache.as_ref() {
                if slot.loaded_at.elapsed() < self.ttl {
                    return Ok(slot.settings.clone());
                }
            }
        }

        let settings = self.provider.load()?;
        *self.cache.write() = Some(CacheSlot {
            settings: settings.clone(),
            loaded_at: Instant::now(),
        });
        Ok(settings)
    }

    /// Drop the cached snapshot; the next read hits the provider
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// Set the delivery target base URL. Invalid URLs are rejected
    /// synchronously and leave the stored configuration untouched.
    pub fn set_target_base_url(&self, url: &str) -> Result<()> {
        validate_target_url(url)?;
        self.update(|settings| settings.target_base_url = url.to_string())
    }

    /// Enable or disable dispatch globally
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|settings| settings.enabled = enabled)
    }

    /// Replace retry behavior
    pub fn set_retry(&self, retry: RetrySettings) -> Result<()> {
        if retry.max_retries == 0 {
            return Err(PipelineError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }
        self.update(|settings| settings.retry = retry.clone())
    }

    fn update(&self, mutate: impl Fn(&mut PipelineSettings)) -> Result<()> {
        let mut settings = self.provider.load()?;
        mutate(&mut settings);
        self.provider.save(&settings)?;
        self.invalidate();
        Ok(())
    }
}
