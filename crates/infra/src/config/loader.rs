//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If `BULWARK_SERVICES` is set, the environment is authoritative
//! 2. Otherwise `BULWARK_CONFIG_PATH` names the config file
//! 3. Otherwise multiple paths are probed for a config file
//! 4. JSON and TOML are supported, chosen by extension
//!
//! ## Environment Variables
//! - `BULWARK_SERVICES`: comma-separated service names (required)
//! - `BULWARK_BIND_ADDR`: server bind address
//! - `BULWARK_HEALTH_INTERVAL_SECS`, `BULWARK_HEALTH_PROBE_TIMEOUT_SECS`,
//!   `BULWARK_SLOW_RESPONSE_MS`: health probing
//! - `BULWARK_WEBHOOK_TOLERANCE_SECS`: accepted webhook clock skew
//! - `BULWARK_EVENTS_FLUSH_INTERVAL_SECS`, `BULWARK_EVENTS_WATERMARK`,
//!   `BULWARK_EVENTS_MAX_BUFFERED`: event batching
//!
//! Per service, with `<NAME>` upper-cased and `-`/`.` replaced by `_`:
//! - `BULWARK_SERVICE_<NAME>_BASE_URL` (required)
//! - `_HEALTH_PATH`, `_CRITICAL`
//! - `_FAILURE_THRESHOLD`, `_RESET_TIMEOUT_MS`, `_MONITORING_PERIOD_MS`,
//!   `_VOLUME_THRESHOLD`
//! - `_MAX_ATTEMPTS`, `_INITIAL_DELAY_MS`, `_MAX_DELAY_MS`, `_FACTOR`,
//!   `_JITTER`, `_REQUEST_TIMEOUT_MS`
//! - `_WEBHOOK_SECRET`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.{json,toml}` then `./bulwark.{json,toml}`
//! 2. `../config.{json,toml}` and `../../config.{json,toml}`
//! 3. The same names relative to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use bulwark_domain::{AppConfig, BulwarkError, Result, ServiceConfig};

const SERVICES_VAR: &str = "BULWARK_SERVICES";
const CONFIG_PATH_VAR: &str = "BULWARK_CONFIG_PATH";

/// Load and validate configuration with automatic fallback strategy
///
/// # Errors
/// Returns `BulwarkError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - A value fails validation
pub fn load() -> Result<AppConfig> {
    if std::env::var_os(SERVICES_VAR).is_some() {
        let config = load_from_env()?;
        tracing::info!(
            services = config.services.len(),
            "Configuration loaded from environment variables"
        );
        return Ok(config);
    }

    tracing::debug!("{SERVICES_VAR} not set, loading configuration from file");
    let path = std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from);
    load_from_file(path)
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `BulwarkError::Config` if `BULWARK_SERVICES` or a service base
/// URL is missing, a value does not parse, or validation fails.
pub fn load_from_env() -> Result<AppConfig> {
    let mut config = AppConfig::default();

    if let Ok(bind_addr) = std::env::var("BULWARK_BIND_ADDR") {
        config.server.bind_addr = bind_addr;
    }

    config.health.interval_secs =
        env_parse("BULWARK_HEALTH_INTERVAL_SECS", config.health.interval_secs)?;
    config.health.probe_timeout_secs =
        env_parse("BULWARK_HEALTH_PROBE_TIMEOUT_SECS", config.health.probe_timeout_secs)?;
    config.health.slow_response_ms =
        env_parse("BULWARK_SLOW_RESPONSE_MS", config.health.slow_response_ms)?;

    config.webhooks.tolerance_secs =
        env_parse("BULWARK_WEBHOOK_TOLERANCE_SECS", config.webhooks.tolerance_secs)?;

    config.events.flush_interval_secs =
        env_parse("BULWARK_EVENTS_FLUSH_INTERVAL_SECS", config.events.flush_interval_secs)?;
    config.events.watermark = env_parse("BULWARK_EVENTS_WATERMARK", config.events.watermark)?;
    config.events.max_buffered =
        env_parse("BULWARK_EVENTS_MAX_BUFFERED", config.events.max_buffered)?;

    let names = env_var(SERVICES_VAR)?;
    config.services = names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(service_from_env)
        .collect::<Result<_>>()?;

    config.validate()?;
    Ok(config)
}

fn service_from_env(name: &str) -> Result<ServiceConfig> {
    let prefix = service_env_prefix(name);
    let key = |suffix: &str| format!("{prefix}{suffix}");

    let mut service = ServiceConfig::new(name, env_var(&key("BASE_URL"))?);
    if let Ok(path) = std::env::var(key("HEALTH_PATH")) {
        service.health_path = path;
    }
    service.critical = env_bool(&key("CRITICAL"), service.critical);

    service.failure_threshold = env_parse(&key("FAILURE_THRESHOLD"), service.failure_threshold)?;
    service.reset_timeout_ms = env_parse(&key("RESET_TIMEOUT_MS"), service.reset_timeout_ms)?;
    service.monitoring_period_ms =
        env_parse(&key("MONITORING_PERIOD_MS"), service.monitoring_period_ms)?;
    service.volume_threshold = env_parse_opt(&key("VOLUME_THRESHOLD"))?;

    service.max_attempts = env_parse(&key("MAX_ATTEMPTS"), service.max_attempts)?;
    service.initial_delay_ms = env_parse(&key("INITIAL_DELAY_MS"), service.initial_delay_ms)?;
    service.max_delay_ms = env_parse(&key("MAX_DELAY_MS"), service.max_delay_ms)?;
    service.factor = env_parse(&key("FACTOR"), service.factor)?;
    service.jitter = env_bool(&key("JITTER"), service.jitter);
    service.request_timeout_ms = env_parse(&key("REQUEST_TIMEOUT_MS"), service.request_timeout_ms)?;

    service.webhook_secret = std::env::var(key("WEBHOOK_SECRET")).ok().filter(|s| !s.is_empty());
    Ok(service)
}

/// `BULWARK_SERVICE_<NAME>_` for a service name
pub fn service_env_prefix(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("BULWARK_SERVICE_{normalized}_")
}

/// Load and validate configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
///
/// # Errors
/// Returns `BulwarkError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid or validation fails
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(BulwarkError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            BulwarkError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| BulwarkError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration; format is chosen by extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| BulwarkError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| BulwarkError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(BulwarkError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 8] = [
        "config.json",
        "config.toml",
        "bulwark.json",
        "bulwark.toml",
        "../config.json",
        "../config.toml",
        "../../config.json",
        "../../config.toml",
    ];

    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        BulwarkError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Parse an optional environment variable, falling back to `default`
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_parse_opt(key)?.unwrap_or(default))
}

fn env_parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| BulwarkError::Config(format!("Invalid value for {key}: {e}"))),
        _ => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn clear_env(vars: &[&str]) {
        for var in vars {
            std::env::remove_var(var);
        }
    }

    fn temp_config(contents: &str, extension: &str) -> PathBuf {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        path
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for (i, value) in ["1", "true", "yes", "on", "TRUE"].iter().enumerate() {
            let key = format!("BULWARK_TEST_BOOL_TRUE_{i}");
            std::env::set_var(&key, value);
            assert!(env_bool(&key, false), "{value} should be true");
            std::env::remove_var(&key);
        }
        for (i, value) in ["0", "false", "no", "off"].iter().enumerate() {
            let key = format!("BULWARK_TEST_BOOL_FALSE_{i}");
            std::env::set_var(&key, value);
            assert!(!env_bool(&key, true), "{value} should be false");
            std::env::remove_var(&key);
        }

        std::env::remove_var("BULWARK_TEST_BOOL_MISSING");
        assert!(env_bool("BULWARK_TEST_BOOL_MISSING", true));
        assert!(!env_bool("BULWARK_TEST_BOOL_MISSING", false));
    }

    #[test]
    fn test_service_env_prefix() {
        assert_eq!(service_env_prefix("crm"), "BULWARK_SERVICE_CRM_");
        assert_eq!(service_env_prefix("crm-prod.eu"), "BULWARK_SERVICE_CRM_PROD_EU_");
    }

    #[test]
    fn test_load_from_env_with_services() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        let vars = [
            "BULWARK_SERVICES",
            "BULWARK_BIND_ADDR",
            "BULWARK_WEBHOOK_TOLERANCE_SECS",
            "BULWARK_SERVICE_SLACK_BASE_URL",
            "BULWARK_SERVICE_SLACK_WEBHOOK_SECRET",
            "BULWARK_SERVICE_SLACK_CRITICAL",
            "BULWARK_SERVICE_CRM_API_BASE_URL",
            "BULWARK_SERVICE_CRM_API_FAILURE_THRESHOLD",
            "BULWARK_SERVICE_CRM_API_VOLUME_THRESHOLD",
            "BULWARK_SERVICE_CRM_API_JITTER",
        ];

        std::env::set_var("BULWARK_SERVICES", "slack, crm-api");
        std::env::set_var("BULWARK_BIND_ADDR", "127.0.0.1:9000");
        std::env::set_var("BULWARK_WEBHOOK_TOLERANCE_SECS", "120");
        std::env::set_var("BULWARK_SERVICE_SLACK_BASE_URL", "https://slack.com/api");
        std::env::set_var("BULWARK_SERVICE_SLACK_WEBHOOK_SECRET", "s3cr3t");
        std::env::set_var("BULWARK_SERVICE_SLACK_CRITICAL", "no");
        std::env::set_var("BULWARK_SERVICE_CRM_API_BASE_URL", "https://crm.example.com");
        std::env::set_var("BULWARK_SERVICE_CRM_API_FAILURE_THRESHOLD", "3");
        std::env::set_var("BULWARK_SERVICE_CRM_API_VOLUME_THRESHOLD", "10");
        std::env::set_var("BULWARK_SERVICE_CRM_API_JITTER", "off");

        let result = load_from_env();
        clear_env(&vars);

        let config = result.expect("config from env");
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.webhooks.tolerance(), Duration::from_secs(120));
        assert_eq!(config.events.watermark, 100);

        let slack = config.service("slack").unwrap();
        assert_eq!(slack.webhook_secret.as_deref(), Some("s3cr3t"));
        assert!(!slack.critical);
        assert_eq!(slack.failure_threshold, 5);

        let crm = config.service("crm-api").unwrap();
        assert_eq!(crm.failure_threshold, 3);
        assert_eq!(crm.volume_threshold, Some(10));
        assert!(!crm.jitter);
        assert!(crm.critical);
    }

    #[test]
    fn test_load_from_env_missing_base_url() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        std::env::set_var("BULWARK_SERVICES", "ghost");
        std::env::remove_var("BULWARK_SERVICE_GHOST_BASE_URL");

        let result = load_from_env();
        clear_env(&["BULWARK_SERVICES"]);

        let err = result.unwrap_err();
        assert!(matches!(err, BulwarkError::Config(ref msg) if msg.contains("BULWARK_SERVICE_GHOST_BASE_URL")));
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        std::env::set_var("BULWARK_SERVICES", "");
        std::env::set_var("BULWARK_EVENTS_WATERMARK", "lots");

        let result = load_from_env();
        clear_env(&["BULWARK_SERVICES", "BULWARK_EVENTS_WATERMARK"]);

        let err = result.unwrap_err();
        assert!(matches!(err, BulwarkError::Config(ref msg) if msg.contains("BULWARK_EVENTS_WATERMARK")));
    }

    #[test]
    fn test_load_from_env_runs_validation() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        let vars = ["BULWARK_SERVICES", "BULWARK_SERVICE_CRM_BASE_URL", "BULWARK_SERVICE_CRM_MAX_ATTEMPTS"];
        std::env::set_var("BULWARK_SERVICES", "crm");
        std::env::set_var("BULWARK_SERVICE_CRM_BASE_URL", "https://crm.example.com");
        std::env::set_var("BULWARK_SERVICE_CRM_MAX_ATTEMPTS", "0");

        let result = load_from_env();
        clear_env(&vars);

        assert!(matches!(result, Err(BulwarkError::Config(ref msg)) if msg.contains("max_attempts")));
    }

    #[test]
    fn test_load_uses_config_path_when_services_unset() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        let path = temp_config(
            r#"{"services":[{"name":"calendly","base_url":"https://api.calendly.com"}]}"#,
            "json",
        );
        std::env::remove_var("BULWARK_SERVICES");
        std::env::set_var("BULWARK_CONFIG_PATH", &path);

        let result = load();
        clear_env(&["BULWARK_CONFIG_PATH"]);
        std::fs::remove_file(path).ok();

        let config = result.expect("config from file");
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].name, "calendly");
    }

    #[test]
    fn test_load_from_file_toml() {
        let path = temp_config(
            r#"
[server]
bind_addr = "127.0.0.1:8081"

[events]
flush_interval_secs = 2
watermark = 10
max_buffered = 50

[[services]]
name = "slack"
base_url = "https://slack.com/api"
health_path = "/api.test"
webhook_secret = "abc"
max_attempts = 4
"#,
            "toml",
        );

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let config = result.expect("config from TOML");
        assert_eq!(config.server.bind_addr, "127.0.0.1:8081");
        assert_eq!(config.events.max_buffered, 50);
        let slack = config.service("slack").unwrap();
        assert_eq!(slack.health_path, "/api.test");
        assert_eq!(slack.max_attempts, 4);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let path = temp_config(
            r#"{"events":{"watermark":500,"max_buffered":100},"services":[]}"#,
            "json",
        );

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(matches!(result, Err(BulwarkError::Config(ref msg)) if msg.contains("watermark")));
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/config.json")));
        assert!(matches!(result, Err(BulwarkError::Config(_))));
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("bind_addr: x", &PathBuf::from("test.yaml"));
        assert!(result.is_err(), "Should fail with unsupported format");
    }
}
