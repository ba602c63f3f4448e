//! Buffered event batching
//!
//! Producers call [`EventBatcher::enqueue`] and move on. A scheduler calls
//! [`EventBatcher::drain_and_flush`] on an interval or when the watermark is
//! reached. The drain swaps the queue out under the lock, so events enqueued
//! while a flush is in flight land in the fresh queue and are neither lost
//! nor flushed twice.
//!
//! While the sink is failing the watermark is not signalled, so retries
//! happen at the scheduler's interval instead of once per enqueued event.
//! A batch the sink rejects as non-retryable is dropped, not requeued.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bulwark_common::error::ErrorClassification;
use bulwark_domain::{BufferedEvent, EventConfig};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::ports::EventSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatcherConfig {
    /// Queue length that triggers an early flush
    pub watermark: usize,
    /// Hard cap on buffered events; oldest are dropped beyond it
    pub max_buffered: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self { watermark: 100, max_buffered: 10_000 }
    }
}

impl From<&EventConfig> for BatcherConfig {
    fn from(config: &EventConfig) -> Self {
        Self { watermark: config.watermark, max_buffered: config.max_buffered }
    }
}

/// Result of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    /// Events put back at the front after a sink failure
    pub requeued: usize,
    /// Events dropped to respect the cap, or rejected by the sink
    pub dropped: usize,
}

/// Bounded, ordered event buffer in front of an [`EventSink`]
pub struct EventBatcher {
    config: BatcherConfig,
    queue: Mutex<VecDeque<BufferedEvent>>,
    sink: Arc<dyn EventSink>,
    flush_lock: tokio::sync::Mutex<()>,
    watermark: Notify,
    dropped: AtomicU64,
    sink_failing: AtomicBool,
}

impl fmt::Debug for EventBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBatcher")
            .field("config", &self.config)
            .field("buffered", &self.len())
            .field("dropped_total", &self.dropped_total())
            .field("sink_failing", &self.is_sink_failing())
            .finish()
    }
}

impl EventBatcher {
    pub fn new(sink: Arc<dyn EventSink>, config: BatcherConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(VecDeque::new()),
            sink,
            flush_lock: tokio::sync::Mutex::new(()),
            watermark: Notify::new(),
            dropped: AtomicU64::new(0),
            sink_failing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> BatcherConfig {
        self.config
    }

    /// Append an event. Never blocks on the sink and never fails.
    pub fn enqueue(&self, event: BufferedEvent) {
        let (len, overflow) = {
            let mut queue = self.queue.lock();
            queue.push_back(event);
            let overflow = queue.len().saturating_sub(self.config.max_buffered);
            queue.drain(..overflow);
            (queue.len(), overflow)
        };

        if overflow > 0 {
            self.dropped.fetch_add(overflow as u64, Ordering::Relaxed);
            warn!(dropped = overflow, max_buffered = self.config.max_buffered, "event buffer full, dropped oldest");
        }
        if len >= self.config.watermark && !self.is_sink_failing() {
            self.watermark.notify_one();
        }
    }

    /// Swap the queue out and deliver it to the sink.
    ///
    /// On a retryable sink failure the batch goes back to the front, ahead of
    /// anything enqueued meanwhile, trimmed from the oldest end to
    /// `max_buffered`, and watermark signals pause until a flush succeeds.
    /// A non-retryable rejection drops the batch.
    pub async fn drain_and_flush(&self) -> FlushReport {
        let _flushing = self.flush_lock.lock().await;

        let batch: Vec<BufferedEvent> = std::mem::take(&mut *self.queue.lock()).into();
        if batch.is_empty() {
            return FlushReport::default();
        }

        match self.sink.flush(&batch).await {
            Ok(()) => {
                self.sink_failing.store(false, Ordering::Release);
                debug!(count = batch.len(), "flushed buffered events");
                FlushReport { flushed: batch.len(), ..FlushReport::default() }
            }
            Err(err) if !err.is_retryable() => {
                self.sink_failing.store(false, Ordering::Release);
                let dropped = batch.len();
                self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
                warn!(error = %err, dropped, "event sink rejected batch, dropped");
                FlushReport { flushed: 0, requeued: 0, dropped }
            }
            Err(err) => {
                self.sink_failing.store(true, Ordering::Release);
                let batch_len = batch.len();
                let (overflow, buffered) = {
                    let mut queue = self.queue.lock();
                    let mut restored: VecDeque<BufferedEvent> = batch.into();
                    restored.append(&mut queue);
                    let overflow = restored.len().saturating_sub(self.config.max_buffered);
                    restored.drain(..overflow);
                    *queue = restored;
                    (overflow, queue.len())
                };

                if overflow > 0 {
                    self.dropped.fetch_add(overflow as u64, Ordering::Relaxed);
                }
                let requeued = batch_len.saturating_sub(overflow);
                warn!(
                    error = %err,
                    requeued,
                    dropped = overflow,
                    buffered,
                    "event sink flush failed, requeued batch"
                );
                FlushReport { flushed: 0, requeued, dropped: overflow }
            }
        }
    }

    /// Resolves once the queue has reached the watermark since the last wait
    pub async fn watermark_reached(&self) {
        self.watermark.notified().await;
    }

    /// Whether the last flush failed with a retryable error
    pub fn is_sink_failing(&self) -> bool {
        self.sink_failing.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Events dropped over the batcher's lifetime
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
