//! Periodic health probing.
//!
//! Runs [`HealthRegistry::probe_all`] on a fixed interval, starting with an
//! immediate round, and feeds each measured probe latency into the
//! [`ThresholdMonitor`] as `api_response_time` (milliseconds).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bulwark_core::HealthRegistry;
//! use bulwark_infra::scheduling::{HealthScheduler, HealthSchedulerConfig};
//!
//! # async fn example() -> Result<(), bulwark_infra::scheduling::SchedulerError> {
//! let registry = Arc::new(HealthRegistry::new());
//! let mut scheduler = HealthScheduler::new(registry, HealthSchedulerConfig::default());
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bulwark_core::events::alerts::METRIC_API_RESPONSE_TIME;
use bulwark_core::{HealthRegistry, HealthSample, ThresholdMonitor};
use bulwark_domain::HealthConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the health scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSchedulerConfig {
    /// Time between probe rounds
    pub interval: Duration,
    /// Per-probe timeout
    pub probe_timeout: Duration,
    /// Successful probes at or above this latency are degraded
    pub slow_threshold: Duration,
    /// How long `stop` waits for the background task
    pub join_timeout: Duration,
}

impl Default for HealthSchedulerConfig {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

impl From<&HealthConfig> for HealthSchedulerConfig {
    fn from(config: &HealthConfig) -> Self {
        Self {
            interval: config.interval(),
            probe_timeout: config.probe_timeout(),
            slow_threshold: config.slow_response_threshold(),
            join_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
struct ProbeRound {
    registry: Arc<HealthRegistry>,
    monitor: Option<Arc<ThresholdMonitor>>,
    probe_timeout: Duration,
    slow_threshold: Duration,
}

impl ProbeRound {
    async fn run(&self) -> Vec<(String, HealthSample)> {
        let results = self.registry.probe_all(self.probe_timeout, self.slow_threshold).await;

        let unhealthy = results.iter().filter(|(_, s)| s.status().is_unhealthy()).count();
        debug!(probed = results.len(), unhealthy, "health probe round finished");

        if let Some(monitor) = &self.monitor {
            for (_, sample) in &results {
                if let Some(latency) = sample.latency() {
                    monitor.observe(METRIC_API_RESPONSE_TIME, latency.as_secs_f64() * 1_000.0);
                }
            }
        }
        results
    }
}

/// Interval-driven health probe scheduler
pub struct HealthScheduler {
    round: ProbeRound,
    config: HealthSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl HealthScheduler {
    pub fn new(registry: Arc<HealthRegistry>, config: HealthSchedulerConfig) -> Self {
        Self {
            round: ProbeRound {
                registry,
                monitor: None,
                probe_timeout: config.probe_timeout,
                slow_threshold: config.slow_threshold,
            },
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Feed probe latencies into `monitor`
    pub fn with_monitor(mut self, monitor: Arc<ThresholdMonitor>) -> Self {
        self.round.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &HealthSchedulerConfig {
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

        // Fresh token so the scheduler can be restarted after stop
        self.cancellation_token = CancellationToken::new();

        let round = self.round.clone();
        let interval = self.config.interval;
        let cancel = self.cancellation_token.clone();
        let handle = tokio::spawn(async move {
            Self::probe_loop(round, interval, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        info!(interval_secs = interval.as_secs(), "Health scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running or the task does not finish
    /// within the join timeout
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();
        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.join_timeout;
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(SchedulerError::TaskJoinFailed(err.to_string())),
                Err(_) => return Err(SchedulerError::Timeout { seconds: join_timeout.as_secs() }),
            }
        }

        info!("Health scheduler stopped");
        Ok(())
    }

    /// Run exactly one probe round on the caller's task.
    pub async fn run_once(&self) -> Vec<(String, HealthSample)> {
        self.round.run().await
    }

    /// Check if scheduler is running
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn probe_loop(round: ProbeRound, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Health probe loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let results = round.run().await;
                    if results.is_empty() {
                        warn!("no services with health probes registered");
                    }
                }
            }
        }
    }
}
