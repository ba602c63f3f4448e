//! Outbound call error taxonomy
//!
//! [`TransportError`] is what a single attempt reports; it is classified at
//! its origin (the transport adapter) rather than re-derived from response
//! bodies later. [`ClientError`] is what callers of the resilient client see.

use std::time::Duration;

use bulwark_common::error::{ErrorClassification, ErrorSeverity};
use bulwark_domain::BulwarkError;
use thiserror::Error;

/// Outcome of one failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The attempt did not complete within the request timeout
    #[error("request timed out")]
    Timeout,

    /// Connection refused, reset or otherwise broken
    #[error("connection failed: {0}")]
    Connection(String),

    /// 5xx response
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 429 response, optionally with a `Retry-After` hint
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// 4xx response other than 429
    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    /// Response could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Classify an HTTP error status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited { retry_after: None },
            500..=599 => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::Server { .. } | Self::RateLimited { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Error surfaced by [`ResilientClient::execute`](super::ResilientClient::execute)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Breaker denied the call; no network attempt was made
    #[error("circuit open for '{service}'")]
    CircuitOpen { service: String, retry_after: Option<Duration> },

    /// Transient failures used up the retry budget
    #[error("'{service}' failed after {attempts} attempt(s): {last_error}")]
    Exhausted { service: String, attempts: u32, last_error: TransportError },

    /// 4xx from the dependency; never retried
    #[error("'{service}' rejected the request with {status}: {message}")]
    ClientRequest { service: String, status: u16, message: String },

    /// Response could not be decoded; never retried
    #[error("'{service}' returned a malformed response: {message}")]
    MalformedResponse { service: String, message: String },
}

impl ClientError {
    pub fn service(&self) -> &str {
        match self {
            Self::CircuitOpen { service, .. }
            | Self::Exhausted { service, .. }
            | Self::ClientRequest { service, .. }
            | Self::MalformedResponse { service, .. } => service,
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Exhausted { .. } => "exhausted",
            Self::ClientRequest { .. } => "client_request",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }

    /// Build the terminal error for a non-transient attempt failure.
    pub(crate) fn terminal(service: &str, error: TransportError) -> Self {
        match error {
            TransportError::Client { status, message } => {
                Self::ClientRequest { service: service.to_string(), status, message }
            }
            TransportError::Malformed(message) => {
                Self::MalformedResponse { service: service.to_string(), message }
            }
            other => Self::Exhausted { service: service.to_string(), attempts: 1, last_error: other },
        }
    }
}

impl ErrorClassification for ClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Exhausted { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } => ErrorSeverity::Warning,
            Self::Exhausted { .. } | Self::MalformedResponse { .. } => ErrorSeverity::Error,
            Self::ClientRequest { .. } => ErrorSeverity::Info,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            Self::Exhausted { last_error, .. } => last_error.retry_after(),
            _ => None,
        }
    }
}

impl From<ClientError> for BulwarkError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::ClientRequest { .. } => Self::InvalidInput(err.to_string()),
            _ => Self::Network(err.to_string()),
        }
    }
}
