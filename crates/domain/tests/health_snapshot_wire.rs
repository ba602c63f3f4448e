//! Wire format of the health snapshot served to dashboards

use std::collections::BTreeMap;

use bulwark_domain::{HealthSnapshot, HealthStatus, ServiceHealthRecord};
use chrono::Utc;
use serde_json::json;

fn record(name: &str, status: HealthStatus, critical: bool) -> ServiceHealthRecord {
    ServiceHealthRecord {
        status,
        last_checked_at: Some(Utc::now()),
        ..ServiceHealthRecord::pending(name, critical)
    }
}

#[test]
fn snapshot_serializes_records_by_name() {
    let mut services = BTreeMap::new();
    services.insert("crm".to_string(), record("crm", HealthStatus::Healthy, true));
    let mut slack = record("slack", HealthStatus::Unhealthy, false);
    slack.last_error = Some("HTTP 503 Service Unavailable".into());
    services.insert("slack".to_string(), slack);

    let snapshot = HealthSnapshot::from_records(services);
    let value = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(value["overall"], "degraded");
    assert_eq!(value["services"]["slack"]["status"], "unhealthy");
    assert_eq!(value["services"]["slack"]["last_error"], "HTTP 503 Service Unavailable");
    assert!(value["services"]["crm"].get("last_error").is_none());
    assert!(value["services"]["crm"].get("latency_ms").is_none());
}

#[test]
fn snapshot_reads_back_from_json() {
    let value = json!({
        "overall": "unhealthy",
        "services": {
            "crm": {
                "service_name": "crm",
                "status": "unhealthy",
                "critical": true,
                "last_checked_at": "2024-05-01T12:00:00Z",
                "last_error": "connection refused"
            }
        },
        "generated_at": "2024-05-01T12:00:01Z"
    });

    let snapshot: HealthSnapshot = serde_json::from_value(value).unwrap();
    assert_eq!(snapshot.overall, HealthStatus::Unhealthy);
    assert_eq!(snapshot.unhealthy_services(), vec!["crm"]);
    assert_eq!(snapshot.services["crm"].latency_ms, None);
}
