//! Exponential backoff policy
//!
//! [`RetryPolicy`] is a stateless value object. The delay before retry number
//! `attempt` (1-based, counting the failed attempt that triggered it) is
//!
//! ```text
//! min(max_delay, initial_delay * factor^(attempt - 1))
//! ```
//!
//! optionally randomized within ±50% when jitter is enabled, and never above
//! `max_delay`.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// Errors produced by backoff computation and validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackoffError {
    /// Attempt numbers start at 1
    #[error("Invalid attempt number {attempt}: attempts start at 1")]
    InvalidAttempt { attempt: u32 },

    #[error("Invalid retry policy: {message}")]
    InvalidPolicy { message: String },
}

/// Retry/backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// # Errors
    /// Returns [`BackoffError::InvalidPolicy`] for zero attempts, a factor
    /// below 1.0 or an initial delay above the maximum.
    pub fn validate(&self) -> Result<(), BackoffError> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be greater than 0"));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(invalid("factor must be a finite number >= 1.0"));
        }
        if self.initial_delay > self.max_delay {
            return Err(invalid("initial_delay must not exceed max_delay"));
        }
        Ok(())
    }

    /// Delay before the next attempt, without jitter.
    ///
    /// # Errors
    /// Returns [`BackoffError::InvalidAttempt`] when `attempt` is 0.
    pub fn base_delay(&self, attempt: u32) -> Result<Duration, BackoffError> {
        if attempt == 0 {
            return Err(BackoffError::InvalidAttempt { attempt });
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_millis() as f64 * self.factor.powi(exponent);
        let cap = self.max_delay.as_millis() as f64;

        if !millis.is_finite() || millis >= cap {
            return Ok(self.max_delay);
        }
        Ok(Duration::from_millis(millis as u64))
    }

    /// Delay before the next attempt, jittered when enabled.
    ///
    /// # Errors
    /// Returns [`BackoffError::InvalidAttempt`] when `attempt` is 0.
    pub fn next_delay(&self, attempt: u32) -> Result<Duration, BackoffError> {
        self.next_delay_with(attempt, &mut rand::thread_rng())
    }

    /// [`next_delay`](Self::next_delay) with a caller-supplied RNG.
    ///
    /// # Errors
    /// Returns [`BackoffError::InvalidAttempt`] when `attempt` is 0.
    pub fn next_delay_with<R: Rng>(
        &self,
        attempt: u32,
        rng: &mut R,
    ) -> Result<Duration, BackoffError> {
        let base = self.base_delay(attempt)?;
        if !self.jitter || base.is_zero() {
            return Ok(base);
        }

        let scale: f64 = rng.gen_range(0.5..=1.5);
        Ok(base.mul_f64(scale).min(self.max_delay))
    }

    /// Delay honouring a server-provided `Retry-After`, capped at
    /// `max_delay`. Falls back to [`next_delay`](Self::next_delay).
    ///
    /// # Errors
    /// Returns [`BackoffError::InvalidAttempt`] when `attempt` is 0.
    pub fn delay_with_retry_after(
        &self,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> Result<Duration, BackoffError> {
        match retry_after {
            Some(hint) if attempt > 0 => Ok(hint.min(self.max_delay)),
            _ => self.next_delay(attempt),
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    pub fn has_attempts_remaining(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

fn invalid(message: &str) -> BackoffError {
    BackoffError::InvalidPolicy { message: message.to_string() }
}

/// Builder for [`RetryPolicy`]
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.policy.factor = factor;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.policy.jitter = enabled;
        self
    }

    /// # Errors
    /// Returns [`BackoffError::InvalidPolicy`] if validation fails.
    pub fn build(self) -> Result<RetryPolicy, BackoffError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}
