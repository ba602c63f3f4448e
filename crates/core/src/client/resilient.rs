//! Resilient outbound call executor
//!
//! `execute` runs one logical call:
//!
//! 1. Ask the breaker for a permit. Denied means `CircuitOpen` with no
//!    network attempt and no delay.
//! 2. Run the request under `request_timeout`.
//! 3. Success records success and returns.
//! 4. A transient failure sleeps for the policy delay and retries while
//!    attempts remain, then records one failure and returns `Exhausted`.
//! 5. A non-transient failure records one failure and returns immediately.
//!
//! Retries assume the wrapped request is safe to repeat. Call sites that are
//! not idempotent must use a single-attempt policy or an idempotency key.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bulwark_common::resilience::{CallPermit, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use bulwark_common::time::{Clock, SystemClock};
use bulwark_domain::{BulwarkError, ServiceConfig};
use tracing::{debug, instrument, warn};

use super::error::{ClientError, TransportError};
use crate::health::{HealthRegistry, HealthSample, RegistryTransitionListener};

/// Default latency at which a successful call is reported as degraded
const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(1_000);

/// Breaker + timeout + retry wrapper shared by every integration client
#[derive(Debug)]
pub struct ResilientClient<C: Clock = SystemClock> {
    service: String,
    breaker: Arc<CircuitBreaker<C>>,
    policy: RetryPolicy,
    request_timeout: Duration,
    slow_threshold: Duration,
    health: Option<Arc<HealthRegistry>>,
}

impl ResilientClient<SystemClock> {
    /// Build the breaker and policy from service configuration.
    ///
    /// When a registry is given, breaker transitions and call outcomes are
    /// reported to it under the service name.
    ///
    /// # Errors
    /// Returns [`BulwarkError::Config`] for invalid breaker or retry settings.
    pub fn from_config(
        config: &ServiceConfig,
        health: Option<Arc<HealthRegistry>>,
    ) -> Result<Self, BulwarkError> {
        let breaker_config = CircuitBreakerConfig {
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout(),
            monitoring_period: config.monitoring_period(),
            volume_threshold: config.volume_threshold,
        };
        let mut breaker = CircuitBreaker::new(config.name.clone(), breaker_config)
            .map_err(|e| BulwarkError::Config(format!("service '{}': {e}", config.name)))?;
        if let Some(registry) = &health {
            breaker = breaker.with_listener(Arc::new(RegistryTransitionListener::new(registry)));
        }

        let policy = RetryPolicy {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            factor: config.factor,
            jitter: config.jitter,
        };
        policy
            .validate()
            .map_err(|e| BulwarkError::Config(format!("service '{}': {e}", config.name)))?;

        let client = Self::new(config.name.clone(), Arc::new(breaker), policy, config.request_timeout());
        Ok(match health {
            Some(registry) => client.with_health(registry),
            None => client,
        })
    }
}

impl<C: Clock> ResilientClient<C> {
    pub fn new(
        service: impl Into<String>,
        breaker: Arc<CircuitBreaker<C>>,
        policy: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            service: service.into(),
            breaker,
            policy,
            request_timeout,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            health: None,
        }
    }

    /// Report call outcomes to the health registry
    pub fn with_health(mut self, registry: Arc<HealthRegistry>) -> Self {
        self.health = Some(registry);
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `request_fn` with breaker gating, per-attempt timeout and retries.
    ///
    /// `request_fn` is invoked once per attempt.
    ///
    /// # Errors
    /// See [`ClientError`] for the possible outcomes.
    #[instrument(skip_all, fields(service = %self.service))]
    pub async fn execute<T, F, Fut>(&self, mut request_fn: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let Some(permit) = self.breaker.try_acquire() else {
            debug!("circuit open, short-circuiting call");
            return Err(ClientError::CircuitOpen {
                service: self.service.clone(),
                retry_after: self.breaker.retry_after(),
            });
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let started = tokio::time::Instant::now();
            let outcome = tokio::time::timeout(self.request_timeout, request_fn())
                .await
                .unwrap_or(Err(TransportError::Timeout));
            let latency = started.elapsed();

            let error = match outcome {
                Ok(value) => {
                    self.breaker.record_success_for(&permit);
                    self.report(HealthSample::from_latency(latency, self.slow_threshold));
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                warn!(attempt, error = %error, "non-transient failure, not retrying");
                return Err(self.fail(&permit, latency, ClientError::terminal(&self.service, error)));
            }

            if !self.policy.has_attempts_remaining(attempt) {
                warn!(attempts = attempt, error = %error, "retry budget exhausted");
                let exhausted = ClientError::Exhausted {
                    service: self.service.clone(),
                    attempts: attempt,
                    last_error: error,
                };
                return Err(self.fail(&permit, latency, exhausted));
            }

            let delay = self
                .policy
                .delay_with_retry_after(attempt, error.retry_after())
                .unwrap_or(self.policy.max_delay);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Report the failure, then record it on the breaker so a resulting
    /// transition sample is the last one written.
    fn fail(&self, permit: &CallPermit, latency: Duration, error: ClientError) -> ClientError {
        self.report(HealthSample::Degraded { reason: error.to_string(), latency: Some(latency) });
        self.breaker.record_failure_for(permit);
        error
    }

    fn report(&self, sample: HealthSample) {
        let Some(registry) = &self.health else {
            return;
        };
        if let Err(err) = registry.record_sample(&self.service, sample) {
            debug!(error = %err, "service not registered for health tracking");
        }
    }
}
