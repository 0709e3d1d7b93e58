//! # System Constants
//!
//! Shared default values and well-known names for the event delivery and
//! diagnostic logging pipeline. Kept in one place so operational tuning has a
//! single source of truth.

/// Default tuning values for delivery, resilience and log upload behavior
pub mod defaults {
    /// Maximum delivery attempts for a single event (first try included)
    pub const MAX_RETRIES: u32 = 3;

    /// Base backoff delay in milliseconds; doubles after each failed attempt
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Consecutive failures before a circuit breaker opens
    pub const BREAKER_THRESHOLD: u32 = 5;

    /// Cooldown before an open circuit admits a trial call, in milliseconds
    pub const BREAKER_RESET_TIMEOUT_MS: u64 = 60_000;

    /// In-memory log buffer bound; oldest entries are pruned beyond this
    pub const LOG_BUFFER_CAPACITY: usize = 100;

    /// Periodic log flush interval in seconds (5 minutes)
    pub const FLUSH_INTERVAL_SECS: u64 = 300;

    /// TTL for the cached settings snapshot, in seconds
    pub const SETTINGS_CACHE_TTL_SECS: u64 = 60;

    /// HTTP request timeout in seconds
    pub const HTTP_TIMEOUT_SECS: u64 = 30;

    /// HTTP connection timeout in seconds
    pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Synced log entries older than this are eligible for deletion, in seconds
    pub const LOG_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;
}

/// Canonical event type names emitted by the platform
pub mod event_types {
    pub const USER_REGISTERED: &str = "user_registered";
    pub const LESSON_COMPLETED: &str = "lesson_completed";
    pub const PAYMENT_SUCCESS: &str = "payment_success";
    pub const COURSE_COMPLETED: &str = "course_completed";
    pub const USER_INACTIVE: &str = "user_inactive";
    pub const CONNECTION_TEST: &str = "connection_test";
}

/// Default webhook endpoint paths, joined onto the configured base URL
pub mod routes {
    pub const USER_REGISTERED: &str = "/webhook/user-registered";
    pub const LESSON_COMPLETED: &str = "/webhook/lesson-completed";
    pub const PAYMENT_SUCCESS: &str = "/webhook/payment-success";
    pub const COURSE_COMPLETED: &str = "/webhook/course-completed";
    pub const USER_INACTIVE: &str = "/webhook/user-inactive";
    pub const LOG_BATCH: &str = "/webhook/client-logs";
}

/// Process-level identification reported with log batches
pub mod system {
    /// Application version as compiled into the crate
    pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
}
