//! In-memory sink for tests and local runs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bulwark_domain::BufferedEvent;
use parking_lot::Mutex;

use super::ports::{EventSink, SinkFlushError};

/// Collects flushed events; can be told to fail or reject the next N flushes.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<BufferedEvent>>,
    batches: AtomicUsize,
    attempts: AtomicUsize,
    failures_remaining: AtomicUsize,
    rejecting: AtomicBool,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` flush calls with `Unavailable`
    pub fn fail_next(&self, count: usize) {
        self.rejecting.store(false, Ordering::SeqCst);
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` flush calls with `Rejected`
    pub fn reject_next(&self, count: usize) {
        self.rejecting.store(true, Ordering::SeqCst);
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<BufferedEvent> {
        self.events.lock().clone()
    }

    /// Number of successful flush calls
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Number of flush calls, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn flush(&self, batch: &[BufferedEvent]) -> Result<(), SinkFlushError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(if self.rejecting.load(Ordering::SeqCst) {
                SinkFlushError::Rejected("memory sink told to reject".to_string())
            } else {
                SinkFlushError::Unavailable("memory sink told to fail".to_string())
            });
        }

        self.events.lock().extend_from_slice(batch);
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
