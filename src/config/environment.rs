//! # Environment Policy
//!
//! Centralizes every mock-vs-live decision behind one injected policy object,
//! instead of re-reading ambient configuration at each call site. Development
//! permits mock behavior unless explicitly disabled; production forbids it and
//! requires a complete, secure configuration.

use crate::config::PipelineSettings;
use serde::{Deserialize, Serialize};

/// Deployment environment of the running process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Detect the environment from `STUDYFLOW_ENV` / `APP_ENV`, defaulting to
    /// development
    pub fn detect() -> Self {
        let name = std::env::var("STUDYFLOW_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_default();
        match name.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// Outcome of validating a configuration against the active environment
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Environment-aware behavior policy consulted uniformly by the pipeline
#[derive(Debug, Clone)]
pub struct EnvironmentPolicy {
    environment: Environment,
    /// Explicit mock-mode override from the settings collaborator; only
    /// honored in development
    mock_override: Option<bool>,
}

impl EnvironmentPolicy {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            mock_override: None,
        }
    }

    /// Apply an explicit mock-mode override (development only)
    pub fn with_mock_override(mut self, enabled: bool) -> Self {
        self.mock_override = Some(enabled);
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Whether delivery should be simulated instead of hitting the network.
    /// Production never mocks, regardless of overrides.
    pub fn mock_enabled(&self) -> bool {
        match self.environment {
            Environment::Development => self.mock_override.unwrap_or(true),
            Environment::Production => false,
        }
    }

    /// Fallback strategies stay enabled in both environments; production
    /// keeps them for resilience rather than convenience.
    pub fn fallbacks_enabled(&self) -> bool {
        true
    }

    /// Default tracing filter level for this environment
    pub fn log_level(&self) -> &'static str {
        match self.environment {
            Environment::Development => "debug",
            Environment::Production => "info",
        }
    }

    /// Validate configuration completeness for the active environment.
    ///
    /// Production requires a non-empty target URL, secure transport, and mock
    /// mode off; development reports the same findings as warnings only.
    pub fn validate_configuration(&self, settings: &PipelineSettings) -> ValidationReport {
        let mut report = ValidationReport::default();
        let strict = self.environment == Environment::Production;

        let mut finding = |report: &mut ValidationReport, message: String| {
            if strict {
                report.error(message);
            } else {
                report.warning(message);
            }
        };

        if settings.target_base_url.trim().is_empty() {
            finding(&mut report, "target base URL is not configured".to_string());
        } else if !settings.target_base_url.starts_with("https://") {
            finding(
                &mut report,
                format!(
                    "target base URL '{}' does not use secure transport",
                    settings.target_base_url
                ),
            );
        }

        if strict && self.mock_override == Some(true) {
            report.error("mock mode must be disabled in production".to_string());
        }

        report.is_valid = report.errors.is_empty();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrySettings;

    fn settings(url: &str) -> PipelineSettings {
        PipelineSettings {
            target_base_url: url.to_string(),
            enabled: true,
            retry: RetrySettings::default(),
            cache_ttl_secs: 60,
        }
    }

    #[test]
    fn development_permits_mock_unless_disabled() {
        let policy = EnvironmentPolicy::new(Environment::Development);
        assert!(policy.mock_enabled());

        let policy = policy.with_mock_override(false);
        assert!(!policy.mock_enabled());
    }

    #[test]
    fn production_never_mocks() {
        let policy =
            EnvironmentPolicy::new(Environment::Production).with_mock_override(true);
        assert!(!policy.mock_enabled());
    }

    #[test]
    fn fallbacks_enabled_everywhere() {
        assert!(EnvironmentPolicy::new(Environment::Development).fallbacks_enabled());
        assert!(EnvironmentPolicy::new(Environment::Production).fallbacks_enabled());
    }

    #[test]
    fn production_requires_complete_configuration() {
        let policy = EnvironmentPolicy::new(Environment::Production);

        let report = policy.validate_configuration(&settings(""));
        assert!(!report.is_valid);
        assert!(!report.errors.is_empty());

        let report = policy.validate_configuration(&settings("http://insecure.example.com"));
        assert!(!report.is_valid);

        let report = policy.validate_configuration(&settings("https://hooks.example.com"));
        assert!(report.is_valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn development_only_warns_on_incomplete_configuration() {
        let policy = EnvironmentPolicy::new(Environment::Development);

        let report = policy.validate_configuration(&settings(""));
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn production_rejects_explicit_mock_override() {
        let policy =
            EnvironmentPolicy::new(Environment::Production).with_mock_override(true);
        let report = policy.validate_configuration(&settings("https://hooks.example.com"));
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("mock")));
    }
}
