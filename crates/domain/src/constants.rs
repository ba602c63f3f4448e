//! Application constants
//!
//! Centralized defaults shared by configuration loading and the runtime
//! components.

// Circuit breaker defaults
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_MONITORING_PERIOD_MS: u64 = 60_000;

// Retry policy defaults
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

// Health monitoring
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_SLOW_RESPONSE_MS: u64 = 1_000;

// Webhooks
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
pub const MAX_CHALLENGE_LENGTH: usize = 1_024;

// Event batching
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_EVENT_WATERMARK: usize = 100;
pub const DEFAULT_MAX_BUFFERED_EVENTS: usize = 10_000;

// Server
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
