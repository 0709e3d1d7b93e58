//! # Log Entry Types
//!
//! Structured log entries and the batch payload shipped to the remote sink.
//! Entries are immutable once constructed; only the store-side `synced` flag
//! (not part of the logical entry) changes after creation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Severity of a captured log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// One structured diagnostic log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Coarse context tag (screen/route) active when the entry was captured
    pub route_tag: String,
}

impl LogEntry {
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        data: Option<Value>,
        session_id: impl Into<String>,
        user_id: Option<String>,
        route_tag: impl Into<String>,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            data,
            timestamp: Utc::now(),
            session_id: session_id.into(),
            user_id,
            route_tag: route_tag.into(),
        }
    }

    /// Timestamp rendered so lexicographic TEXT comparison matches
    /// chronological order
    pub fn timestamp_key(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Wire payload for a remote log batch upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatchPayload {
    pub logs: Vec<LogEntry>,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub environment: String,
    pub app_version: String,
}

impl LogBatchPayload {
    pub fn new(
        logs: Vec<LogEntry>,
        session_id: impl Into<String>,
        user_id: Option<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            logs,
            timestamp: Utc::now(),
            session_id: session_id.into(),
            user_id,
            environment: environment.into(),
            app_version: crate::constants::system::APP_VERSION.to_string(),
        }
    }
}
