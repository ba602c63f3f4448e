//! Event sink that writes each buffered event to the log as JSON

use async_trait::async_trait;
use bulwark_core::{EventSink, SinkFlushError};
use bulwark_domain::{BufferedEvent, Severity};
use tracing::{info, warn};

/// Log target used for flushed events, so they can be routed separately
pub const EVENT_LOG_TARGET: &str = "bulwark::events";

/// Emits one structured log line per event.
///
/// `high` and `critical` events are logged at WARN, everything else at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for TracingEventSink {
    async fn flush(&self, batch: &[BufferedEvent]) -> Result<(), SinkFlushError> {
        // Serialise the whole batch first so a bad event rejects it before
        // anything is written.
        let rendered = batch
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SinkFlushError::Rejected(format!("event not serialisable: {err}")))?;

        for (event, json) in batch.iter().zip(rendered) {
            if event.severity >= Severity::High {
                warn!(
                    target: EVENT_LOG_TARGET,
                    id = %event.id,
                    kind = %event.kind,
                    severity = %event.severity,
                    source = %event.source,
                    event = %json,
                    "event"
                );
            } else {
                info!(
                    target: EVENT_LOG_TARGET,
                    id = %event.id,
                    kind = %event.kind,
                    severity = %event.severity,
                    source = %event.source,
                    event = %json,
                    "event"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bulwark_core::{BatcherConfig, EventBatcher};
    use bulwark_domain::EventKind;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn flushes_every_event() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let batcher = Arc::new(EventBatcher::new(Arc::new(TracingEventSink::new()), BatcherConfig::default()));
        batcher.enqueue(BufferedEvent::security(Severity::Medium, "webhook.slack", json!({ "reason": "signature_mismatch" })));
        batcher.enqueue(BufferedEvent::new(EventKind::Alert, Severity::High, "alert.error_rate", json!({ "value": 0.2 })));

        let report = batcher.drain_and_flush().await;
        assert_eq!(report.flushed, 2);
        assert_eq!(report.requeued, 0);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_is_ok() {
        assert_eq!(TracingEventSink::new().flush(&[]).await, Ok(()));
    }
}
