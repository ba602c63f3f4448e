//! Event batch flushing.
//!
//! Flushes the [`EventBatcher`] every `interval`, or earlier when the queue
//! reaches its watermark. While the sink is failing only the interval
//! triggers flushes. `stop` cancels the loop and performs one final flush so
//! nothing buffered before shutdown is left behind.

use std::sync::Arc;
use std::time::Duration;

use bulwark_core::{EventBatcher, FlushReport};
use bulwark_domain::EventConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the flush scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushSchedulerConfig {
    pub interval: Duration,
    /// How long `stop` waits for the background task
    pub join_timeout: Duration,
}

impl Default for FlushSchedulerConfig {
    fn default() -> Self {
        Self::from(&EventConfig::default())
    }
}

impl From<&EventConfig> for FlushSchedulerConfig {
    fn from(config: &EventConfig) -> Self {
        Self { interval: config.flush_interval(), join_timeout: Duration::from_secs(5) }
    }
}

/// Interval and watermark driven flush scheduler
pub struct FlushScheduler {
    batcher: Arc<EventBatcher>,
    config: FlushSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl FlushScheduler {
    pub fn new(batcher: Arc<EventBatcher>, config: FlushSchedulerConfig) -> Self {
        Self {
            batcher,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &FlushSchedulerConfig {
        &self.config
    }

    /// Start the scheduler
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation_token = CancellationToken::new();

        let batcher = Arc::clone(&self.batcher);
        let interval = self.config.interval;
        let cancel = self.cancellation_token.clone();
        let handle = tokio::spawn(async move {
            Self::flush_loop(batcher, interval, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        info!(interval_secs = interval.as_secs(), "Flush scheduler started");
        Ok(())
    }

    /// Stop the scheduler and flush whatever is still buffered.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running or the task does not finish
    /// within the join timeout. The final flush still runs on timeout.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<FlushReport> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();
        let joined = match self.task_handle.lock().await.take() {
            Some(handle) => {
                let join_timeout = self.config.join_timeout;
                match tokio::time::timeout(join_timeout, handle).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(SchedulerError::TaskJoinFailed(err.to_string())),
                    Err(_) => Err(SchedulerError::Timeout { seconds: join_timeout.as_secs() }),
                }
            }
            None => Ok(()),
        };

        let report = self.batcher.drain_and_flush().await;
        if report.requeued > 0 {
            warn!(requeued = report.requeued, "final flush failed, events left buffered");
        }
        info!(flushed = report.flushed, "Flush scheduler stopped");

        joined.map(|()| report)
    }

    /// Flush once on the caller's task.
    pub async fn run_once(&self) -> FlushReport {
        self.batcher.drain_and_flush().await
    }

    /// Check if scheduler is running
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn flush_loop(batcher: Arc<EventBatcher>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Flush loop cancelled");
                    break;
                }
                _ = ticker.tick() => "interval",
                _ = batcher.watermark_reached(), if !batcher.is_sink_failing() => "watermark",
            };

            let report = batcher.drain_and_flush().await;
            if report.flushed > 0 || report.requeued > 0 {
                debug!(
                    trigger,
                    flushed = report.flushed,
                    requeued = report.requeued,
                    dropped = report.dropped,
                    "flush round finished"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bulwark_core::{BatcherConfig, MemoryEventSink};
    use bulwark_domain::{BufferedEvent, EventKind, Severity};
    use serde_json::json;

    use super::*;

    fn event(n: usize) -> BufferedEvent {
        BufferedEvent::new(EventKind::Monitoring, Severity::Info, "test", json!({ "n": n }))
    }

    fn scheduler(watermark: usize) -> (FlushScheduler, Arc<EventBatcher>, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        let batcher =
            Arc::new(EventBatcher::new(sink.clone(), BatcherConfig { watermark, max_buffered: 1_000 }));
        let config =
            FlushSchedulerConfig { interval: Duration::from_secs(5), join_timeout: Duration::from_secs(5) };
        (FlushScheduler::new(batcher.clone(), config), batcher, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_on_interval() {
        let (mut scheduler, batcher, sink) = scheduler(100);
        scheduler.start().await.unwrap();

        batcher.enqueue(event(0));
        batcher.enqueue(event(1));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(sink.events().is_empty(), "nothing before the first interval");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.events().len(), 2);
        assert!(batcher.is_empty());

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watermark_triggers_early_flush() {
        let (mut scheduler, batcher, sink) = scheduler(3);
        scheduler.start().await.unwrap();
        tokio::task::yield_now().await;

        for n in 0..3 {
            batcher.enqueue(event(n));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.batches(), 1);
        scheduler.stop().await.unwrap();
    }

    /// Validates that a down sink is retried once per interval.
    ///
    /// Assertions:
    /// - A burst of events above the watermark causes a single failed flush.
    /// - The next attempt waits for the interval tick.
    #[tokio::test(start_paused = true)]
    async fn test_failing_sink_retried_on_interval_only() {
        let (mut scheduler, batcher, sink) = scheduler(10);
        sink.fail_next(usize::MAX);
        scheduler.start().await.unwrap();
        tokio::task::yield_now().await;

        for n in 0..200 {
            batcher.enqueue(event(n));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(sink.attempts(), 1, "one watermark flush, then wait for the interval");
        assert_eq!(batcher.len(), 200);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.attempts(), 2);

        sink.fail_next(0);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.events().len(), 200);
        assert!(!batcher.is_sink_failing());

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_performs_final_flush() {
        let (mut scheduler, batcher, sink) = scheduler(100);
        scheduler.start().await.unwrap();

        batcher.enqueue(event(0));
        let report = scheduler.stop().await.unwrap();

        assert_eq!(report.flushed, 1);
        assert_eq!(sink.events().len(), 1);
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.stop().await, Err(SchedulerError::NotRunning));
    }

    #[tokio::test]
    async fn test_run_once_and_double_start() {
        let (mut scheduler, batcher, sink) = scheduler(100);
        batcher.enqueue(event(0));
        assert_eq!(scheduler.run_once().await.flushed, 1);
        assert_eq!(sink.events().len(), 1);

        scheduler.start().await.unwrap();
        assert_eq!(scheduler.start().await, Err(SchedulerError::AlreadyRunning));
        scheduler.stop().await.unwrap();
    }
}
