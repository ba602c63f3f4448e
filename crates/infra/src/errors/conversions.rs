//! Conversions from external infrastructure errors into domain errors.

use bulwark_core::TransportError;
use bulwark_domain::BulwarkError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub BulwarkError);

impl From<InfraError> for BulwarkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<BulwarkError> for InfraError {
    fn from(value: BulwarkError) -> Self {
        InfraError(value)
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → BulwarkError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        if value.is_builder() {
            return InfraError(BulwarkError::Config(format!("invalid HTTP client setup: {value}")));
        }
        InfraError(BulwarkError::Network(classify_http_error(&value).to_string()))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportError */
/* -------------------------------------------------------------------------- */

/// Classify a reqwest failure at its origin.
///
/// Status-carrying errors (from `error_for_status`) keep their status class;
/// everything that never produced a response is a connection problem.
pub fn classify_http_error(err: &HttpError) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    if let Some(status) = err.status() {
        return TransportError::from_status(status.as_u16(), status_message(status));
    }
    if err.is_decode() || err.is_body() {
        return TransportError::Malformed(err.to_string());
    }
    TransportError::Connection(err.to_string())
}

pub(crate) fn status_message(status: reqwest::StatusCode) -> String {
    format!("HTTP {} {}", status.as_u16(), status.canonical_reason().unwrap_or("unknown status"))
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
