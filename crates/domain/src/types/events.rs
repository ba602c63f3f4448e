//! Buffered security/monitoring events and threshold alerts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// Event severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl_domain_status_conversions!(Severity {
    Info => "info",
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Broad category used by sinks to route events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Security,
    Monitoring,
    Alert,
}

impl_domain_status_conversions!(EventKind {
    Security => "security",
    Monitoring => "monitoring",
    Alert => "alert",
});

/// One entry in the event batcher's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub severity: Severity,
    /// Component that produced the event, e.g. `webhook.slack`
    pub source: String,
    pub payload: serde_json::Value,
}

impl BufferedEvent {
    pub fn new(
        kind: EventKind,
        severity: Severity,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            kind,
            severity,
            source: source.into(),
            payload,
        }
    }

    pub fn security(severity: Severity, source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(EventKind::Security, severity, source, payload)
    }
}

/// Threshold breach raised by the alert monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub metric: String,
    pub threshold: f64,
    pub value: f64,
    pub message: String,
}

impl Alert {
    pub fn new(
        severity: Severity,
        metric: impl Into<String>,
        threshold: f64,
        value: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            severity,
            metric: metric.into(),
            threshold,
            value,
            message: message.into(),
        }
    }

    /// Wrap the alert for the event batcher, keeping its id and timestamp.
    pub fn into_event(self) -> BufferedEvent {
        BufferedEvent {
            id: self.id,
            timestamp: self.timestamp,
            kind: EventKind::Alert,
            severity: self.severity,
            source: format!("alert.{}", self.metric),
            payload: serde_json::json!({
                "metric": self.metric,
                "threshold": self.threshold,
                "value": self.value,
                "message": self.message,
            }),
        }
    }
}
