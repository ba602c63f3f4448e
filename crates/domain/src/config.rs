//! Configuration structures
//!
//! Plain data loaded by `bulwark-infra` from the environment or a config
//! file. Durations are stored as integer milliseconds/seconds so the same
//! structs deserialize from TOML, JSON and environment strings.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BIND_ADDR, DEFAULT_EVENT_WATERMARK, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_HEALTH_INTERVAL_SECS, DEFAULT_INITIAL_DELAY_MS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BUFFERED_EVENTS, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MONITORING_PERIOD_MS, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_RESET_TIMEOUT_MS, DEFAULT_SLOW_RESPONSE_MS, DEFAULT_WEBHOOK_TOLERANCE_SECS,
};
use crate::errors::{BulwarkError, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl AppConfig {
    /// Validate every section and reject duplicate service names.
    ///
    /// # Errors
    /// Returns `BulwarkError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.events.validate()?;

        let mut seen = HashSet::new();
        for service in &self.services {
            service.validate()?;
            if !seen.insert(service.name.as_str()) {
                return Err(BulwarkError::Config(format!(
                    "Duplicate service name: {}",
                    service.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr() }
    }
}

/// Health probe scheduling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_slow_response")]
    pub slow_response_ms: u64,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn slow_response_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_response_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_HEALTH_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            slow_response_ms: DEFAULT_SLOW_RESPONSE_MS,
        }
    }
}

/// Inbound webhook verification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Accepted clock skew between the provider timestamp and now
    #[serde(default = "default_webhook_tolerance")]
    pub tolerance_secs: u64,
}

impl WebhookConfig {
    pub fn tolerance(&self) -> Duration {
        Duration::from_secs(self.tolerance_secs)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS }
    }
}

/// Event/alert batching settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Queue length that triggers an early flush
    #[serde(default = "default_watermark")]
    pub watermark: usize,
    /// Hard cap on buffered events; the oldest are dropped beyond it
    #[serde(default = "default_max_buffered")]
    pub max_buffered: usize,
}

impl EventConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.flush_interval_secs == 0 {
            return Err(BulwarkError::Config("events.flush_interval_secs must be > 0".into()));
        }
        if self.watermark == 0 || self.max_buffered == 0 {
            return Err(BulwarkError::Config(
                "events.watermark and events.max_buffered must be > 0".into(),
            ));
        }
        if self.watermark > self.max_buffered {
            return Err(BulwarkError::Config(format!(
                "events.watermark ({}) exceeds events.max_buffered ({})",
                self.watermark, self.max_buffered
            )));
        }
        Ok(())
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            watermark: DEFAULT_EVENT_WATERMARK,
            max_buffered: DEFAULT_MAX_BUFFERED_EVENTS,
        }
    }
}

/// Per-service resilience and webhook settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Critical services make the whole system unhealthy when they fail
    #[serde(default = "default_true")]
    pub critical: bool,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_ms: u64,
    #[serde(default = "default_monitoring_period")]
    pub monitoring_period_ms: u64,
    #[serde(default)]
    pub volume_threshold: Option<u32>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Service with default resilience settings
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            health_path: default_health_path(),
            critical: true,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_ms: DEFAULT_RESET_TIMEOUT_MS,
            monitoring_period_ms: DEFAULT_MONITORING_PERIOD_MS,
            volume_threshold: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            factor: DEFAULT_BACKOFF_FACTOR,
            jitter: true,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            webhook_secret: None,
        }
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate the service settings.
    ///
    /// # Errors
    /// Returns `BulwarkError::Config` naming the offending service and field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(BulwarkError::Config(format!("service '{}': {msg}", self.name)));

        if self.name.trim().is_empty() {
            return Err(BulwarkError::Config("service name must not be empty".into()));
        }
        if self.base_url.trim().is_empty() {
            return fail("base_url must not be empty");
        }
        if self.failure_threshold == 0 {
            return fail("failure_threshold must be > 0");
        }
        if self.reset_timeout_ms == 0 {
            return fail("reset_timeout_ms must be > 0");
        }
        if self.monitoring_period_ms == 0 {
            return fail("monitoring_period_ms must be > 0");
        }
        if self.max_attempts == 0 {
            return fail("max_attempts must be > 0");
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return fail("initial_delay_ms must not exceed max_delay_ms");
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return fail("factor must be >= 1.0");
        }
        if self.request_timeout_ms == 0 {
            return fail("request_timeout_ms must be > 0");
        }
        Ok(())
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("health_path", &self.health_path)
            .field("critical", &self.critical)
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout_ms", &self.reset_timeout_ms)
            .field("monitoring_period_ms", &self.monitoring_period_ms)
            .field("volume_threshold", &self.volume_threshold)
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay_ms", &self.initial_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("factor", &self.factor)
            .field("jitter", &self.jitter)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_health_interval() -> u64 {
    DEFAULT_HEALTH_INTERVAL_SECS
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_slow_response() -> u64 {
    DEFAULT_SLOW_RESPONSE_MS
}

fn default_webhook_tolerance() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_flush_interval() -> u64 {
    DEFAULT_FLUSH_INTERVAL_SECS
}

fn default_watermark() -> usize {
    DEFAULT_EVENT_WATERMARK
}

fn default_max_buffered() -> usize {
    DEFAULT_MAX_BUFFERED_EVENTS
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_reset_timeout() -> u64 {
    DEFAULT_RESET_TIMEOUT_MS
}

fn default_monitoring_period() -> u64 {
    DEFAULT_MONITORING_PERIOD_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

fn default_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_defaults_are_valid() {
        let service = ServiceConfig::new("crm", "https://crm.example.com");
        assert!(service.validate().is_ok());
        assert_eq!(service.failure_threshold, 5);
        assert_eq!(service.reset_timeout(), Duration::from_secs(60));
        assert_eq!(service.max_attempts, 3);
        assert!(service.critical);
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let mut service = ServiceConfig::new("crm", "https://crm.example.com");
        service.initial_delay_ms = 5_000;
        service.max_delay_ms = 1_000;

        let err = service.validate().unwrap_err();
        assert!(matches!(err, BulwarkError::Config(ref msg) if msg.contains("initial_delay_ms")));
    }

    #[test]
    fn test_rejects_zero_threshold_and_attempts() {
        let mut service = ServiceConfig::new("crm", "https://crm.example.com");
        service.failure_threshold = 0;
        assert!(service.validate().is_err());

        let mut service = ServiceConfig::new("crm", "https://crm.example.com");
        service.max_attempts = 0;
        assert!(service.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_service_names() {
        let config = AppConfig {
            services: vec![
                ServiceConfig::new("slack", "https://slack.com/api"),
                ServiceConfig::new("slack", "https://example.com"),
            ],
            ..AppConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, BulwarkError::Config(ref msg) if msg.contains("Duplicate")));
    }

    #[test]
    fn test_debug_redacts_webhook_secret() {
        let mut service = ServiceConfig::new("slack", "https://slack.com/api");
        service.webhook_secret = Some("8f742231b10e8888abcd99yyyzzz85a5".into());

        let rendered = format!("{service:?}");
        assert!(!rendered.contains("8f742231"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"services":[{"name":"calendly","base_url":"https://api.calendly.com"}]}"#,
        )
        .unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.webhooks.tolerance_secs, 300);
        assert_eq!(config.events.flush_interval_secs, 5);
        let service = config.service("calendly").unwrap();
        assert_eq!(service.health_path, "/");
        assert!(service.jitter);
        assert!(config.validate().is_ok());
    }
}
