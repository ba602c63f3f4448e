//! Resilience primitives for outbound calls
//!
//! - **Circuit Breaker**: per-dependency state machine that stops calling a
//!   failing service and probes it with a single trial after a cooldown
//! - **Backoff**: exponential retry delays with optional jitter and
//!   `Retry-After` support
//!
//! Both are synchronous and clock-driven so they can be tested without a
//! runtime; the async retry loop that combines them lives in
//! `bulwark-core::client`.

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{BackoffError, RetryPolicy, RetryPolicyBuilder};
pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitState, ConfigError, ConfigResult, TransitionListener,
};
