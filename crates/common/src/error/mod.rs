//! Shared error classification
//!
//! Crate-specific error enums stay local to their crate (`ClientError`,
//! `WebhookError`, `InfraError`, ...). What they share is the
//! [`ErrorClassification`] trait, so retry loops, HTTP mapping and alerting can
//! reason about any of them the same way:
//!
//! - **`is_retryable()`**: would repeating the operation plausibly succeed?
//! - **`severity()`**: how loudly should this be logged or alerted?
//! - **`is_critical()`**: does it need immediate attention?
//! - **`retry_after()`**: server or breaker provided wait hint, if any
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | Unknown service name, rejected webhook |
//! | **Warning** | Degraded but operational | Circuit open, rate limited, timeouts |
//! | **Error** | Failure requiring attention | Exhausted retries, malformed responses |
//! | **Critical** | System integrity at risk | Missing secrets, internal invariant violations |

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Classification interface implemented by every error type in the workspace
pub trait ErrorClassification {
    /// Whether the failed operation may succeed if attempted again
    fn is_retryable(&self) -> bool;

    /// Severity used for logging and alerting decisions
    fn severity(&self) -> ErrorSeverity;

    /// Whether the error requires immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested wait before retrying, when one is known
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum ProbeError {
        Timeout,
        Throttled(Duration),
        SecretMissing,
    }

    impl ErrorClassification for ProbeError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Timeout | Self::Throttled(_))
        }

        fn severity(&self) -> ErrorSeverity {
            match self {
                Self::Timeout | Self::Throttled(_) => ErrorSeverity::Warning,
                Self::SecretMissing => ErrorSeverity::Critical,
            }
        }

        fn retry_after(&self) -> Option<Duration> {
            match self {
                Self::Throttled(wait) => Some(*wait),
                _ => None,
            }
        }
    }

    #[test]
    fn test_default_criticality_follows_severity() {
        assert!(!ProbeError::Timeout.is_critical());
        assert!(ProbeError::SecretMissing.is_critical());
    }

    #[test]
    fn test_retry_hint() {
        assert_eq!(
            ProbeError::Throttled(Duration::from_secs(2)).retry_after(),
            Some(Duration::from_secs(2))
        );
        assert_eq!(ProbeError::Timeout.retry_after(), None);
        assert!(!ProbeError::SecretMissing.is_retryable());
    }

    #[test]
    fn test_severity_ordering_and_display() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
        assert_eq!(serde_json::to_string(&ErrorSeverity::Critical).unwrap(), "\"critical\"");
    }
}
