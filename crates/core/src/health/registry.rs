//! Health registry
//!
//! Owns one [`ServiceHealthRecord`] per registered service. Samples arrive
//! from three places: the outbound client after each call, circuit breaker
//! transitions (through [`RegistryTransitionListener`]) and the periodic
//! probe round driven by the scheduler.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bulwark_common::resilience::{CircuitState, TransitionListener};
use bulwark_domain::{BulwarkError, HealthSnapshot, HealthStatus, Result, ServiceHealthRecord};
use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::ports::HealthProbe;

/// One observation about a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthSample {
    Healthy { latency: Option<Duration> },
    Degraded { reason: String, latency: Option<Duration> },
    Unhealthy { error: String, latency: Option<Duration> },
}

impl HealthSample {
    /// Classify a successful call by latency: at or above `slow` is degraded.
    pub fn from_latency(latency: Duration, slow: Duration) -> Self {
        if latency >= slow {
            Self::Degraded {
                reason: format!("slow response: {}ms", latency.as_millis()),
                latency: Some(latency),
            }
        } else {
            Self::Healthy { latency: Some(latency) }
        }
    }

    pub fn status(&self) -> HealthStatus {
        match self {
            Self::Healthy { .. } => HealthStatus::Healthy,
            Self::Degraded { .. } => HealthStatus::Degraded,
            Self::Unhealthy { .. } => HealthStatus::Unhealthy,
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            Self::Healthy { latency }
            | Self::Degraded { latency, .. }
            | Self::Unhealthy { latency, .. } => *latency,
        }
    }

    /// Reason or error text, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Healthy { .. } => None,
            Self::Degraded { reason, .. } => Some(reason),
            Self::Unhealthy { error, .. } => Some(error),
        }
    }
}

/// Registration options for [`HealthRegistry::register_with`]
#[derive(Clone)]
pub struct ServiceRegistration {
    pub name: String,
    pub critical: bool,
    pub probe: Option<Arc<dyn HealthProbe>>,
}

impl ServiceRegistration {
    /// Critical service without a probe
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), critical: true, probe: None }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("name", &self.name)
            .field("critical", &self.critical)
            .field("has_probe", &self.probe.is_some())
            .finish()
    }
}

struct Entry {
    record: ServiceHealthRecord,
    probe: Option<Arc<dyn HealthProbe>>,
}

/// Registry of service health records
#[derive(Default)]
pub struct HealthRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthRegistry").field("services", &self.service_names()).finish()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a critical service with a probe
    pub fn register(&self, name: impl Into<String>, probe: Arc<dyn HealthProbe>) {
        self.register_with(ServiceRegistration::new(name).probe(probe));
    }

    /// Register or re-register a service.
    ///
    /// Re-registering keeps the last known record but replaces the probe and
    /// the critical flag.
    pub fn register_with(&self, registration: ServiceRegistration) {
        let ServiceRegistration { name, critical, probe } = registration;
        let mut entries = self.entries.write();

        match entries.get_mut(&name) {
            Some(entry) => {
                entry.record.critical = critical;
                entry.probe = probe;
            }
            None => {
                debug!(service = %name, critical, "registering service");
                let record = ServiceHealthRecord::pending(name.clone(), critical);
                entries.insert(name, Entry { record, probe });
            }
        }
    }

    /// Upsert the record of a registered service.
    ///
    /// # Errors
    /// Returns [`BulwarkError::NotFound`] for unknown services.
    pub fn record_sample(&self, name: &str, sample: HealthSample) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| BulwarkError::NotFound(format!("service '{name}'")))?;

        let previous = entry.record.status;
        let record = &mut entry.record;
        record.status = sample.status();
        record.last_checked_at = Some(Utc::now());
        record.latency_ms = sample.latency().map(|d| d.as_millis() as u64);
        record.last_error = sample.detail().map(str::to_string);

        if previous != record.status {
            match record.status {
                HealthStatus::Unhealthy => warn!(
                    service = %name,
                    from = %previous,
                    error = record.last_error.as_deref().unwrap_or_default(),
                    "service became unhealthy"
                ),
                status => info!(service = %name, from = %previous, to = %status, "service health changed"),
            }
        }

        Ok(())
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let records = self
            .entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.record.clone()))
            .collect();
        HealthSnapshot::from_records(records)
    }

    pub fn service(&self, name: &str) -> Option<ServiceHealthRecord> {
        self.entries.read().get(name).map(|entry| entry.record.clone())
    }

    /// Readiness: overall status is not unhealthy
    pub fn is_ready(&self) -> bool {
        !self.snapshot().overall.is_unhealthy()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Run every registered probe concurrently and record the results.
    ///
    /// Each probe gets its own `timeout`; a successful probe at or above
    /// `slow` is recorded as degraded. Services without a probe are skipped.
    pub async fn probe_all(&self, timeout: Duration, slow: Duration) -> Vec<(String, HealthSample)> {
        let probes: Vec<(String, Arc<dyn HealthProbe>)> = self
            .entries
            .read()
            .iter()
            .filter_map(|(name, entry)| entry.probe.clone().map(|probe| (name.clone(), probe)))
            .collect();

        let rounds = probes.into_iter().map(|(name, probe)| async move {
            let started = tokio::time::Instant::now();
            let sample = match tokio::time::timeout(timeout, probe.probe()).await {
                Ok(Ok(())) => HealthSample::from_latency(started.elapsed(), slow),
                Ok(Err(error)) => {
                    HealthSample::Unhealthy { error, latency: Some(started.elapsed()) }
                }
                Err(_) => HealthSample::Unhealthy {
                    error: format!("probe timed out after {}ms", timeout.as_millis()),
                    latency: Some(timeout),
                },
            };
            (name, sample)
        });

        let results = join_all(rounds).await;
        for (name, sample) in &results {
            // A service may have been removed while its probe was running.
            if let Err(err) = self.record_sample(name, sample.clone()) {
                debug!(service = %name, error = %err, "dropping probe result");
            }
        }
        results
    }
}

/// Reports circuit breaker transitions as health samples:
/// open is unhealthy, half-open is degraded, closed is healthy pending the
/// next latency measurement.
///
/// Holds the registry weakly: the registry owns health probes, and probes
/// own the breaker this listener is attached to.
#[derive(Debug, Clone)]
pub struct RegistryTransitionListener {
    registry: Weak<HealthRegistry>,
}

impl RegistryTransitionListener {
    pub fn new(registry: &Arc<HealthRegistry>) -> Self {
        Self { registry: Arc::downgrade(registry) }
    }
}

impl TransitionListener for RegistryTransitionListener {
    fn on_transition(&self, breaker: &str, _from: CircuitState, to: CircuitState) {
        let sample = match to {
            CircuitState::Open => {
                HealthSample::Unhealthy { error: "circuit breaker open".to_string(), latency: None }
            }
            CircuitState::HalfOpen => HealthSample::Degraded {
                reason: "circuit breaker half-open".to_string(),
                latency: None,
            },
            CircuitState::Closed => HealthSample::Healthy { latency: None },
        };

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if let Err(err) = registry.record_sample(breaker, sample) {
            debug!(breaker, error = %err, "breaker is not registered for health tracking");
        }
    }
}
