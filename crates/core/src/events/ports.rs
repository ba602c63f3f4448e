//! Event sink port

use async_trait::async_trait;
use bulwark_common::error::{ErrorClassification, ErrorSeverity};
use bulwark_domain::BufferedEvent;
use thiserror::Error;

/// Failure reported by a sink. Handled inside the batcher by requeueing;
/// never surfaced to producers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkFlushError {
    #[error("event sink unavailable: {0}")]
    Unavailable(String),

    #[error("event sink rejected batch: {0}")]
    Rejected(String),
}

impl ErrorClassification for SinkFlushError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }
}

/// Destination for drained event batches (persistence, notification, logs)
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver a batch in order. An error means none of it was accepted.
    async fn flush(&self, batch: &[BufferedEvent]) -> Result<(), SinkFlushError>;
}
