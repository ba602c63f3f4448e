//! Application context - dependency injection container

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bulwark_core::{
    BatcherConfig, EventBatcher, EventSink, HealthRegistry, ServiceRegistration, ThresholdMonitor,
    WebhookGuard, WebhookProvider, WebhookSecrets,
};
use bulwark_domain::{AppConfig, Result};
use bulwark_infra::{
    FlushScheduler, FlushSchedulerConfig, HealthScheduler, HealthSchedulerConfig, ServiceClient,
    TracingEventSink,
};
use tracing::{debug, info, warn};

/// Version reported by the health endpoints
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: AppConfig,
    pub registry: Arc<HealthRegistry>,
    pub clients: BTreeMap<String, Arc<ServiceClient>>,
    pub guard: Arc<WebhookGuard>,
    pub batcher: Arc<EventBatcher>,
    pub monitor: Arc<ThresholdMonitor>,
    started_at: Instant,
}

impl AppContext {
    /// Build the context with the tracing event sink.
    ///
    /// # Errors
    /// Returns [`bulwark_domain::BulwarkError::Config`] when the configuration
    /// is invalid or a service client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(TracingEventSink::new()))
    }

    /// Build the context around an explicit event sink.
    ///
    /// # Errors
    /// Same as [`AppContext::new`].
    pub fn with_sink(config: AppConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;

        let batcher = Arc::new(EventBatcher::new(sink, BatcherConfig::from(&config.events)));
        let monitor = Arc::new(ThresholdMonitor::new(batcher.clone()));
        let registry = Arc::new(HealthRegistry::new());

        let mut clients = BTreeMap::new();
        let mut secrets = WebhookSecrets::new();
        for service in &config.services {
            let client = Arc::new(ServiceClient::from_config(service, Some(registry.clone()))?);
            registry.register_with(
                ServiceRegistration::new(service.name.clone())
                    .critical(service.critical)
                    .probe(Arc::new(client.health_probe())),
            );

            if let Some(secret) = &service.webhook_secret {
                match service.name.parse::<WebhookProvider>() {
                    Ok(provider) => secrets.insert(provider, secret.clone()),
                    Err(err) => warn!(service = %service.name, error = %err, "webhook secret ignored"),
                }
            }

            debug!(service = %service.name, critical = service.critical, "service client ready");
            clients.insert(service.name.clone(), client);
        }

        info!(
            services = clients.len(),
            webhook_providers = ?secrets.configured(),
            "application context initialised"
        );

        let guard = Arc::new(WebhookGuard::new(secrets, config.webhooks.tolerance()));
        Ok(Self { config, registry, clients, guard, batcher, monitor, started_at: Instant::now() })
    }

    pub fn client(&self, name: &str) -> Option<&Arc<ServiceClient>> {
        self.clients.get(name)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Health probe scheduler wired to the registry and threshold monitor
    pub fn health_scheduler(&self) -> HealthScheduler {
        HealthScheduler::new(self.registry.clone(), HealthSchedulerConfig::from(&self.config.health))
            .with_monitor(self.monitor.clone())
    }

    pub fn flush_scheduler(&self) -> FlushScheduler {
        FlushScheduler::new(self.batcher.clone(), FlushSchedulerConfig::from(&self.config.events))
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("services", &self.clients.keys().collect::<Vec<_>>())
            .field("guard", &self.guard)
            .field("buffered_events", &self.batcher.len())
            .finish_non_exhaustive()
    }
}
