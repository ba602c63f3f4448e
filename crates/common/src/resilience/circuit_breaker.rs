//! Circuit breaker state machine
//!
//! One breaker guards one logical outbound dependency. It moves through
//! three states:
//!
//! - `closed`: every request is admitted. Consecutive failures are counted
//!   and any success resets the count to zero. Reaching
//!   `failure_threshold` opens the breaker.
//! - `open`: requests are denied until `reset_timeout` has elapsed since the
//!   breaker opened. The first caller after that moves the breaker to
//!   `half_open` and becomes the single trial request.
//! - `half_open`: only the trial is in flight; everyone else is denied. A
//!   successful trial closes the breaker, a failed one reopens it and
//!   restarts the cooldown.
//!
//! Every transition bumps a generation counter. Callers that obtained a
//! [`CallPermit`] before the transition can no longer change the breaker with
//! their (late) outcome, which keeps abandoned or slow calls from undoing a
//! newer decision.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::time::{Clock, SystemClock};

//==============================================================================
// Error Types
//==============================================================================

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

//==============================================================================
// State & Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected without reaching the dependency
    Open,
    /// A single trial request is probing recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Cooldown before an open circuit admits a trial request
    pub reset_timeout: Duration,
    /// Window over which admitted requests are counted for `volume_threshold`
    pub monitoring_period: Duration,
    /// Minimum admitted requests within the current monitoring period before
    /// failures may open the circuit
    pub volume_threshold: Option<u32>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(60),
            volume_threshold: None,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for zero thresholds or durations.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.reset_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                message: "reset_timeout must be greater than 0".to_string(),
            });
        }

        if self.monitoring_period.is_zero() {
            return Err(ConfigError::Invalid {
                message: "monitoring_period must be greater than 0".to_string(),
            });
        }

        if self.volume_threshold == Some(0) {
            return Err(ConfigError::Invalid {
                message: "volume_threshold must be greater than 0 when set".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.config.monitoring_period = period;
        self
    }

    pub fn volume_threshold(mut self, volume: u32) -> Self {
        self.config.volume_threshold = Some(volume);
        self
    }

    /// # Errors
    /// Returns [`ConfigError::Invalid`] if validation fails.
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Listeners, Permits & Metrics
//==============================================================================

/// Observer notified after every state transition.
///
/// Called outside the breaker's lock, so implementations may query the
/// breaker again.
pub trait TransitionListener: Send + Sync {
    fn on_transition(&self, breaker: &str, from: CircuitState, to: CircuitState);
}

/// Admission ticket returned by [`CircuitBreaker::try_acquire`].
///
/// Outcomes reported through a permit only count while the breaker is still
/// in the generation that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "report the call outcome with record_success_for/record_failure_for"]
pub struct CallPermit {
    generation: u64,
    trial: bool,
}

impl CallPermit {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this permit is the half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

/// Snapshot of breaker counters for health and diagnostics output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub requests_in_period: u32,
    pub last_failure_age_ms: Option<u64>,
    /// Remaining cooldown while open
    pub retry_after_ms: Option<u64>,
    pub generation: u64,
}

//==============================================================================
// Circuit Breaker
//==============================================================================

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    trial_started_at: Option<Instant>,
    generation: u64,
    period_start: Instant,
    requests_in_period: u32,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
}

impl BreakerState {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
            trial_started_at: None,
            generation: 0,
            period_start: now,
            requests_in_period: 0,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
        }
    }

    fn transition(&mut self, to: CircuitState) -> (CircuitState, CircuitState) {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        (from, to)
    }
}

/// Per-dependency circuit breaker.
///
/// All state sits behind a single mutex, so transitions for one breaker are
/// serialized while different breakers evolve independently.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    listeners: Vec<Arc<dyn TransitionListener>>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker backed by the system clock
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the configuration is invalid.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the configuration is invalid.
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let now = clock.now();

        Ok(Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new(now)),
            listeners: Vec::new(),
            clock,
        })
    }

    /// Register a transition listener. Call before sharing the breaker.
    pub fn with_listener(mut self, listener: Arc<dyn TransitionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a request may proceed right now.
    ///
    /// In `open`, the first call after the cooldown moves the breaker to
    /// `half_open` and is admitted as the trial; concurrent callers are
    /// denied until the trial resolves.
    pub fn allow_request(&self) -> bool {
        self.try_acquire().is_some()
    }

    /// Admit a request and return a permit bound to the current generation.
    pub fn try_acquire(&self) -> Option<CallPermit> {
        let now = self.clock.now();
        let mut transition = None;

        let permit = {
            let mut inner = self.lock();
            self.roll_period(&mut inner, now);

            match inner.state {
                CircuitState::Closed => {
                    inner.requests_in_period = inner.requests_in_period.saturating_add(1);
                    Some(CallPermit { generation: inner.generation, trial: false })
                }
                CircuitState::Open => {
                    let cooled = inner
                        .opened_at
                        .map_or(true, |opened| now.duration_since(opened) >= self.config.reset_timeout);
                    if cooled {
                        transition = Some(inner.transition(CircuitState::HalfOpen));
                        inner.trial_started_at = Some(now);
                        Some(CallPermit { generation: inner.generation, trial: true })
                    } else {
                        inner.total_rejections += 1;
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    // A trial that never reported back is abandoned after a
                    // full reset timeout; its generation is retired.
                    let stale = inner.trial_started_at.map_or(true, |started| {
                        now.duration_since(started) >= self.config.reset_timeout
                    });
                    if stale {
                        inner.generation += 1;
                        inner.trial_started_at = Some(now);
                        debug!(breaker = %self.name, "replacing abandoned half-open trial");
                        Some(CallPermit { generation: inner.generation, trial: true })
                    } else {
                        inner.total_rejections += 1;
                        None
                    }
                }
            }
        };

        self.notify(transition);
        permit
    }

    /// Record a success against the current state.
    pub fn record_success(&self) {
        let transition = {
            let mut inner = self.lock();
            self.apply_success(&mut inner)
        };
        self.notify(transition);
    }

    /// Record a failure against the current state.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let transition = {
            let mut inner = self.lock();
            self.apply_failure(&mut inner, now)
        };
        self.notify(transition);
    }

    /// Record a success for a permit. Returns `false` if the permit's
    /// generation is stale and the outcome was ignored.
    pub fn record_success_for(&self, permit: &CallPermit) -> bool {
        let transition = {
            let mut inner = self.lock();
            if inner.generation != permit.generation {
                debug!(
                    breaker = %self.name,
                    permit_generation = permit.generation,
                    current_generation = inner.generation,
                    "ignoring stale success"
                );
                return false;
            }
            self.apply_success(&mut inner)
        };
        self.notify(transition);
        true
    }

    /// Record a failure for a permit. Returns `false` if the permit's
    /// generation is stale and the outcome was ignored.
    pub fn record_failure_for(&self, permit: &CallPermit) -> bool {
        let now = self.clock.now();
        let transition = {
            let mut inner = self.lock();
            if inner.generation != permit.generation {
                debug!(
                    breaker = %self.name,
                    permit_generation = permit.generation,
                    current_generation = inner.generation,
                    "ignoring stale failure"
                );
                return false;
            }
            self.apply_failure(&mut inner, now)
        };
        self.notify(transition);
        true
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Remaining cooldown while open, `None` otherwise
    pub fn retry_after(&self) -> Option<Duration> {
        let now = self.clock.now();
        let inner = self.lock();
        self.remaining_cooldown(&inner, now)
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.clock.now();
        let inner = self.lock();

        CircuitBreakerMetrics {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
            requests_in_period: inner.requests_in_period,
            last_failure_age_ms: inner
                .last_failure_at
                .map(|at| now.duration_since(at).as_millis() as u64),
            retry_after_ms: self.remaining_cooldown(&inner, now).map(|d| d.as_millis() as u64),
            generation: inner.generation,
        }
    }

    /// Force the breaker closed and clear failure history
    pub fn reset(&self) {
        let now = self.clock.now();
        let transition = {
            let mut inner = self.lock();
            let transition = (inner.state != CircuitState::Closed)
                .then(|| inner.transition(CircuitState::Closed));
            if transition.is_none() {
                inner.generation += 1;
            }
            inner.consecutive_failures = 0;
            inner.last_failure_at = None;
            inner.opened_at = None;
            inner.trial_started_at = None;
            inner.period_start = now;
            inner.requests_in_period = 0;
            transition
        };
        info!(breaker = %self.name, "circuit breaker manually reset");
        self.notify(transition);
    }

    fn apply_success(&self, inner: &mut BreakerState) -> Option<(CircuitState, CircuitState)> {
        inner.total_successes += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.trial_started_at = None;
                info!(breaker = %self.name, "trial request succeeded, closing circuit");
                Some(inner.transition(CircuitState::Closed))
            }
            CircuitState::Open => {
                debug!(breaker = %self.name, "success reported while open");
                None
            }
        }
    }

    fn apply_failure(
        &self,
        inner: &mut BreakerState,
        now: Instant,
    ) -> Option<(CircuitState, CircuitState)> {
        inner.total_failures += 1;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                let enough_volume = self
                    .config
                    .volume_threshold
                    .map_or(true, |volume| inner.requests_in_period >= volume);

                if inner.consecutive_failures >= self.config.failure_threshold && enough_volume {
                    inner.opened_at = Some(now);
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                        "circuit breaker opened"
                    );
                    Some(inner.transition(CircuitState::Open))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.opened_at = Some(now);
                inner.trial_started_at = None;
                warn!(breaker = %self.name, "trial request failed, reopening circuit");
                Some(inner.transition(CircuitState::Open))
            }
            CircuitState::Open => None,
        }
    }

    fn roll_period(&self, inner: &mut BreakerState, now: Instant) {
        if now.duration_since(inner.period_start) >= self.config.monitoring_period {
            inner.period_start = now;
            inner.requests_in_period = 0;
        }
    }

    fn remaining_cooldown(&self, inner: &BreakerState, now: Instant) -> Option<Duration> {
        if inner.state != CircuitState::Open {
            return None;
        }
        let opened = inner.opened_at?;
        Some(self.config.reset_timeout.saturating_sub(now.duration_since(opened)))
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };
        debug!(breaker = %self.name, %from, %to, "circuit state transition");
        for listener in &self.listeners {
            listener.on_transition(&self.name, from, to);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(breaker = %self.name, "circuit breaker state lock poisoned");
                poisoned.into_inner()
            }
        }
    }
}
