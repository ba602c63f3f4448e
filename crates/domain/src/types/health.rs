//! Health data model shared by the registry, schedulers and HTTP layer

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Health of a single service or of the whole system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl_domain_status_conversions!(HealthStatus {
    Healthy => "healthy",
    Degraded => "degraded",
    Unhealthy => "unhealthy",
});

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }
}

/// Latest known health of one registered service.
///
/// Upserted by the health registry on every sample; everything else only
/// reads copies of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealthRecord {
    pub service_name: String,
    pub status: HealthStatus,
    pub critical: bool,
    /// `None` until the first sample arrives
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl ServiceHealthRecord {
    /// Record for a freshly registered service that has not been probed yet
    pub fn pending(service_name: impl Into<String>, critical: bool) -> Self {
        Self {
            service_name: service_name.into(),
            status: HealthStatus::Healthy,
            critical,
            last_checked_at: None,
            last_error: None,
            latency_ms: None,
        }
    }
}

/// Point-in-time view over every registered service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub overall: HealthStatus,
    pub services: BTreeMap<String, ServiceHealthRecord>,
    pub generated_at: DateTime<Utc>,
}

impl HealthSnapshot {
    /// Build a snapshot and derive the overall status.
    pub fn from_records(services: BTreeMap<String, ServiceHealthRecord>) -> Self {
        let overall = aggregate(services.values());
        Self { overall, services, generated_at: Utc::now() }
    }

    /// Services currently reported unhealthy, critical ones first
    pub fn unhealthy_services(&self) -> Vec<&str> {
        let mut names: Vec<&ServiceHealthRecord> =
            self.services.values().filter(|r| r.status.is_unhealthy()).collect();
        names.sort_by_key(|r| !r.critical);
        names.into_iter().map(|r| r.service_name.as_str()).collect()
    }
}

/// Overall status from individual records.
///
/// - `Unhealthy` if any critical service is unhealthy.
/// - `Degraded` if any service is degraded, or a non-critical service is
///   unhealthy.
/// - `Healthy` otherwise (including when nothing is registered).
pub fn aggregate<'a>(records: impl IntoIterator<Item = &'a ServiceHealthRecord>) -> HealthStatus {
    let mut overall = HealthStatus::Healthy;
    for record in records {
        match (record.status, record.critical) {
            (HealthStatus::Unhealthy, true) => return HealthStatus::Unhealthy,
            (HealthStatus::Unhealthy, false) | (HealthStatus::Degraded, _) => {
                overall = HealthStatus::Degraded;
            }
            (HealthStatus::Healthy, _) => {}
        }
    }
    overall
}
