//! Inbound webhook verification
//!
//! Each request walks one [`WebhookVerificationContext`] through
//!
//! ```text
//! received -> headers_extracted -> signature_computed -> compared -> accepted
//!                                                                  \-> rejected
//! ```
//!
//! and may drop to `rejected` from any stage. The signature is always
//! computed over the exact bytes received.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bulwark_common::crypto::{constant_time_eq, hmac_sha256_hex};
use bulwark_common::error::{ErrorClassification, ErrorSeverity};
use bulwark_common::time::{Clock, SystemClock};
use bulwark_domain::{BufferedEvent, Severity};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::provider::{WebhookHeaders, WebhookProvider};

/// Why a webhook was rejected. Details stay server-side; senders only ever
/// see [`public_message`](Self::public_message).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookVerificationError {
    #[error("no signing secret configured for provider")]
    SecretNotConfigured,

    #[error("missing header '{header}'")]
    MissingHeader { header: String },

    #[error("malformed header '{header}': {reason}")]
    MalformedHeader { header: String, reason: String },

    #[error("timestamp outside tolerance window (skew {skew_secs}s)")]
    TimestampOutOfWindow { skew_secs: i64 },

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("internal verification failure: {0}")]
    Internal(String),
}

impl WebhookVerificationError {
    /// HTTP status returned to the sender
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Internal(_) => 500,
            _ => 403,
        }
    }

    /// Generic body text that never reveals why verification failed
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Internal(_) => "internal error",
            _ => "forbidden",
        }
    }

    /// Stable label for logs and events
    pub fn code(&self) -> &'static str {
        match self {
            Self::SecretNotConfigured => "secret_not_configured",
            Self::MissingHeader { .. } => "missing_header",
            Self::MalformedHeader { .. } => "malformed_header",
            Self::TimestampOutOfWindow { .. } => "timestamp_out_of_window",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Internal(_) => "internal",
        }
    }
}

impl ErrorClassification for WebhookVerificationError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::SecretNotConfigured | Self::Internal(_) => ErrorSeverity::Critical,
            Self::SignatureMismatch | Self::TimestampOutOfWindow { .. } => ErrorSeverity::Warning,
            Self::MissingHeader { .. } | Self::MalformedHeader { .. } => ErrorSeverity::Info,
        }
    }
}

/// Progress of a single verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    Received,
    HeadersExtracted,
    SignatureComputed,
    Compared,
    Accepted,
    Rejected,
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Received => "received",
            Self::HeadersExtracted => "headers_extracted",
            Self::SignatureComputed => "signature_computed",
            Self::Compared => "compared",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// Per-request verification state; never persisted.
#[derive(Debug, Clone)]
pub struct WebhookVerificationContext<'a> {
    pub provider: WebhookProvider,
    pub raw_body: &'a [u8],
    pub received_signature: Option<String>,
    pub claimed_timestamp: Option<i64>,
    pub computed_signature: Option<String>,
    pub is_valid: bool,
    pub rejection_reason: Option<WebhookVerificationError>,
    pub stage: VerificationStage,
    /// Stage reached before rejection
    pub failed_at: Option<VerificationStage>,
}

impl<'a> WebhookVerificationContext<'a> {
    fn new(provider: WebhookProvider, raw_body: &'a [u8]) -> Self {
        Self {
            provider,
            raw_body,
            received_signature: None,
            claimed_timestamp: None,
            computed_signature: None,
            is_valid: false,
            rejection_reason: None,
            stage: VerificationStage::Received,
            failed_at: None,
        }
    }

    fn reject(mut self, reason: WebhookVerificationError) -> Self {
        self.failed_at = Some(self.stage);
        self.stage = VerificationStage::Rejected;
        self.is_valid = false;
        self.rejection_reason = Some(reason);
        self
    }

    fn accept(mut self) -> Self {
        self.stage = VerificationStage::Accepted;
        self.is_valid = true;
        self
    }

    /// # Errors
    /// Returns the rejection reason unless the request was accepted.
    pub fn outcome(&self) -> Result<(), WebhookVerificationError> {
        match &self.rejection_reason {
            Some(reason) => Err(reason.clone()),
            None if self.is_valid => Ok(()),
            None => Err(WebhookVerificationError::Internal(format!(
                "verification stopped at {}",
                self.stage
            ))),
        }
    }

    /// Security event describing this verification for the event batcher
    pub fn security_event(&self) -> BufferedEvent {
        let severity = match &self.rejection_reason {
            None => Severity::Info,
            Some(WebhookVerificationError::Internal(_)) => Severity::High,
            Some(_) => Severity::Medium,
        };

        let mut payload = json!({
            "provider": self.provider.as_str(),
            "accepted": self.is_valid,
            "stage": self.stage.to_string(),
            "body_bytes": self.raw_body.len(),
            "claimed_timestamp": self.claimed_timestamp,
        });
        if let Some(reason) = &self.rejection_reason {
            payload["reason"] = json!(reason.code());
            payload["detail"] = json!(reason.to_string());
            payload["failed_at"] = json!(self.failed_at.map(|s| s.to_string()));
        }

        BufferedEvent::security(severity, format!("webhook.{}", self.provider), payload)
    }
}

/// Signing secrets per provider; empty secrets count as not configured
#[derive(Clone, Default)]
pub struct WebhookSecrets {
    secrets: HashMap<WebhookProvider, String>,
}

impl WebhookSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: WebhookProvider, secret: impl Into<String>) -> Self {
        self.insert(provider, secret);
        self
    }

    pub fn insert(&mut self, provider: WebhookProvider, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.is_empty() {
            self.secrets.remove(&provider);
        } else {
            self.secrets.insert(provider, secret);
        }
    }

    pub fn get(&self, provider: WebhookProvider) -> Option<&str> {
        self.secrets.get(&provider).map(String::as_str)
    }

    pub fn configured(&self) -> Vec<WebhookProvider> {
        let mut providers: Vec<_> = self.secrets.keys().copied().collect();
        providers.sort();
        providers
    }
}

impl fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSecrets").field("configured", &self.configured()).finish()
    }
}

/// Authenticates inbound webhook requests
#[derive(Debug)]
pub struct WebhookGuard<C: Clock = SystemClock> {
    secrets: WebhookSecrets,
    tolerance: Duration,
    clock: C,
}

impl WebhookGuard<SystemClock> {
    pub fn new(secrets: WebhookSecrets, tolerance: Duration) -> Self {
        Self::with_clock(secrets, tolerance, SystemClock)
    }
}

impl<C: Clock> WebhookGuard<C> {
    pub fn with_clock(secrets: WebhookSecrets, tolerance: Duration, clock: C) -> Self {
        Self { secrets, tolerance, clock }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    pub fn secrets(&self) -> &WebhookSecrets {
        &self.secrets
    }

    /// Verify one request. Never panics; every failure ends in `Rejected`.
    pub fn verify<'a>(
        &self,
        provider: WebhookProvider,
        headers: &WebhookHeaders,
        raw_body: &'a [u8],
    ) -> WebhookVerificationContext<'a> {
        let ctx = self.run(WebhookVerificationContext::new(provider, raw_body), headers);

        match &ctx.rejection_reason {
            None => debug!(provider = %provider, "webhook signature accepted"),
            Some(reason) => warn!(
                provider = %provider,
                reason = reason.code(),
                failed_at = ?ctx.failed_at,
                detail = %reason,
                "webhook rejected"
            ),
        }
        ctx
    }

    fn run<'a>(
        &self,
        mut ctx: WebhookVerificationContext<'a>,
        headers: &WebhookHeaders,
    ) -> WebhookVerificationContext<'a> {
        let parts = match ctx.provider.extract(headers) {
            Ok(parts) => parts,
            Err(err) => return ctx.reject(err),
        };
        ctx.claimed_timestamp = Some(parts.timestamp);
        ctx.received_signature = Some(parts.signature);
        ctx.stage = VerificationStage::HeadersExtracted;

        let skew_secs = self.clock.unix_timestamp().saturating_sub(parts.timestamp);
        if skew_secs.unsigned_abs() > self.tolerance.as_secs() {
            return ctx.reject(WebhookVerificationError::TimestampOutOfWindow { skew_secs });
        }

        let Some(secret) = self.secrets.get(ctx.provider) else {
            return ctx.reject(WebhookVerificationError::SecretNotConfigured);
        };
        let computed = match compute(ctx.provider, secret, parts.timestamp, ctx.raw_body) {
            Ok(hex) => hex,
            Err(err) => return ctx.reject(err),
        };
        ctx.computed_signature = Some(computed);
        ctx.stage = VerificationStage::SignatureComputed;

        let matches = match (&ctx.received_signature, &ctx.computed_signature) {
            (Some(received), Some(computed)) => {
                constant_time_eq(received.to_ascii_lowercase().as_bytes(), computed.as_bytes())
            }
            _ => false,
        };
        ctx.stage = VerificationStage::Compared;

        if matches {
            ctx.accept()
        } else {
            ctx.reject(WebhookVerificationError::SignatureMismatch)
        }
    }

    /// Signature header value for `raw_body` as the provider would send it.
    ///
    /// # Errors
    /// Returns [`WebhookVerificationError::SecretNotConfigured`] if the
    /// provider has no secret.
    pub fn sign(
        &self,
        provider: WebhookProvider,
        timestamp: i64,
        raw_body: &[u8],
    ) -> Result<WebhookHeaders, WebhookVerificationError> {
        let secret = self.secrets.get(provider).ok_or(WebhookVerificationError::SecretNotConfigured)?;
        let hex = compute(provider, secret, timestamp, raw_body)?;
        Ok(WebhookHeaders::from_pairs(provider.signature_headers(timestamp, &hex)))
    }
}

fn compute(
    provider: WebhookProvider,
    secret: &str,
    timestamp: i64,
    raw_body: &[u8],
) -> Result<String, WebhookVerificationError> {
    let prefix = provider.signing_prefix(timestamp);
    hmac_sha256_hex(secret.as_bytes(), &[prefix.as_bytes(), raw_body])
        .map_err(|e| WebhookVerificationError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use bulwark_common::time::MockClock;

    use super::*;
    use crate::webhooks::provider::{CALENDLY_SIGNATURE_HEADER, SLACK_SIGNATURE_HEADER};

    const NOW: u64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"type":"event_callback","event":{"type":"message","text":"hi"}}"#;

    fn guard() -> WebhookGuard<MockClock> {
        let secrets = WebhookSecrets::new()
            .with(WebhookProvider::Slack, "slack-signing-secret")
            .with(WebhookProvider::Calendly, "calendly-signing-key");
        WebhookGuard::with_clock(secrets, Duration::from_secs(300), MockClock::at_unix_timestamp(NOW))
    }

    fn signed(guard: &WebhookGuard<MockClock>, provider: WebhookProvider, ts: i64) -> WebhookHeaders {
        guard.sign(provider, ts, BODY).unwrap()
    }

    #[test]
    fn test_accepts_valid_signatures() {
        let guard = guard();
        for provider in WebhookProvider::ALL {
            let headers = signed(&guard, provider, NOW as i64);
            let ctx = guard.verify(provider, &headers, BODY);

            assert!(ctx.is_valid, "{provider}");
            assert_eq!(ctx.stage, VerificationStage::Accepted);
            assert_eq!(ctx.received_signature, ctx.computed_signature);
            assert!(ctx.outcome().is_ok());
        }
    }

    /// Validates the replay window edges for a 300s tolerance.
    ///
    /// Assertions:
    /// - 299s old is accepted, 301s old is rejected with the skew recorded.
    /// - Timestamps from the future are bounded the same way.
    #[test]
    fn test_timestamp_window() {
        let guard = guard();
        let now = NOW as i64;

        for (ts, accepted) in [(now - 299, true), (now - 300, true), (now - 301, false), (now + 301, false)] {
            let headers = signed(&guard, WebhookProvider::Slack, ts);
            let ctx = guard.verify(WebhookProvider::Slack, &headers, BODY);
            assert_eq!(ctx.is_valid, accepted, "timestamp offset {}", ts - now);
        }

        let headers = signed(&guard, WebhookProvider::Slack, now - 301);
        let ctx = guard.verify(WebhookProvider::Slack, &headers, BODY);
        assert_eq!(
            ctx.rejection_reason,
            Some(WebhookVerificationError::TimestampOutOfWindow { skew_secs: 301 })
        );
        assert_eq!(ctx.failed_at, Some(VerificationStage::HeadersExtracted));
        assert!(ctx.computed_signature.is_none());
    }

    /// Validates that any single flipped body byte invalidates the signature.
    #[test]
    fn test_single_byte_flip_rejected() {
        let guard = guard();
        for provider in WebhookProvider::ALL {
            let headers = signed(&guard, provider, NOW as i64);
            for i in 0..BODY.len() {
                let mut tampered = BODY.to_vec();
                tampered[i] ^= 0x01;
                let ctx = guard.verify(provider, &headers, &tampered);
                assert_eq!(
                    ctx.rejection_reason,
                    Some(WebhookVerificationError::SignatureMismatch),
                    "{provider} byte {i}"
                );
                assert_eq!(ctx.failed_at, Some(VerificationStage::Compared));
            }
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let guard = guard();
        let other = WebhookGuard::with_clock(
            WebhookSecrets::new().with(WebhookProvider::Slack, "someone-else"),
            Duration::from_secs(300),
            MockClock::at_unix_timestamp(NOW),
        );
        let headers = signed(&other, WebhookProvider::Slack, NOW as i64);

        let ctx = guard.verify(WebhookProvider::Slack, &headers, BODY);
        assert_eq!(ctx.outcome(), Err(WebhookVerificationError::SignatureMismatch));
    }

    #[test]
    fn test_missing_secret_rejected() {
        let guard = WebhookGuard::with_clock(
            WebhookSecrets::new().with(WebhookProvider::Slack, ""),
            Duration::from_secs(300),
            MockClock::at_unix_timestamp(NOW),
        );
        let headers = signed(&self::guard(), WebhookProvider::Slack, NOW as i64);

        let ctx = guard.verify(WebhookProvider::Slack, &headers, BODY);
        assert_eq!(ctx.rejection_reason, Some(WebhookVerificationError::SecretNotConfigured));
        assert_eq!(ctx.rejection_reason.as_ref().map(|e| e.status_code()), Some(403));
        assert!(guard.sign(WebhookProvider::Slack, NOW as i64, BODY).is_err());
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let guard = guard();

        let ctx = guard.verify(WebhookProvider::Slack, &WebhookHeaders::new(), BODY);
        assert!(matches!(ctx.rejection_reason, Some(WebhookVerificationError::MissingHeader { .. })));
        assert_eq!(ctx.failed_at, Some(VerificationStage::Received));

        let headers = WebhookHeaders::from_pairs([(CALENDLY_SIGNATURE_HEADER, "v1=abc")]);
        let ctx = guard.verify(WebhookProvider::Calendly, &headers, BODY);
        assert!(matches!(ctx.rejection_reason, Some(WebhookVerificationError::MalformedHeader { .. })));
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let guard = guard();
        let mut headers = signed(&guard, WebhookProvider::Slack, NOW as i64);
        let upper = headers.get(SLACK_SIGNATURE_HEADER).unwrap().replace("v0=", "").to_ascii_uppercase();
        headers.insert(SLACK_SIGNATURE_HEADER, format!("v0={upper}"));

        assert!(guard.verify(WebhookProvider::Slack, &headers, BODY).is_valid);
    }

    #[test]
    fn test_error_surface_is_generic() {
        let mismatch = WebhookVerificationError::SignatureMismatch;
        assert_eq!(mismatch.status_code(), 403);
        assert_eq!(mismatch.public_message(), "forbidden");

        let internal = WebhookVerificationError::Internal("hmac".into());
        assert_eq!(internal.status_code(), 500);
        assert_eq!(internal.public_message(), "internal error");
        assert!(internal.is_critical());
    }

    #[test]
    fn test_security_event_payload() {
        let guard = guard();
        let headers = signed(&guard, WebhookProvider::Calendly, NOW as i64 - 400);
        let ctx = guard.verify(WebhookProvider::Calendly, &headers, BODY);

        let event = ctx.security_event();
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(event.source, "webhook.calendly");
        assert_eq!(event.payload["accepted"], false);
        assert_eq!(event.payload["reason"], "timestamp_out_of_window");

        let ok = guard.verify(
            WebhookProvider::Calendly,
            &signed(&guard, WebhookProvider::Calendly, NOW as i64),
            BODY,
        );
        assert_eq!(ok.security_event().severity, Severity::Info);
    }
}
