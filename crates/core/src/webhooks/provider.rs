//! Webhook providers and their signing schemes
//!
//! | Provider | Headers | Signed string | Header value |
//! |----------|---------|---------------|--------------|
//! | Slack | `x-slack-request-timestamp`, `x-slack-signature` | `v0:{ts}:{body}` | `v0={hex}` |
//! | Calendly | `calendly-webhook-signature` | `{ts}.{body}` | `t={ts},v1={hex}` |
//!
//! Both sign with HMAC-SHA256 over the raw request bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::guard::WebhookVerificationError;

pub const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub const CALENDLY_SIGNATURE_HEADER: &str = "calendly-webhook-signature";

/// Providers whose callbacks the guard can authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookProvider {
    Slack,
    Calendly,
}

impl WebhookProvider {
    pub const ALL: [Self; 2] = [Self::Slack, Self::Calendly];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Calendly => "calendly",
        }
    }

    /// Pull the claimed timestamp and hex signature out of the headers.
    pub(crate) fn extract(
        self,
        headers: &WebhookHeaders,
    ) -> Result<SignedParts, WebhookVerificationError> {
        match self {
            Self::Slack => {
                let raw_ts = required(headers, SLACK_TIMESTAMP_HEADER)?;
                let timestamp = parse_timestamp(SLACK_TIMESTAMP_HEADER, raw_ts)?;
                let raw_sig = required(headers, SLACK_SIGNATURE_HEADER)?;
                let signature = raw_sig.strip_prefix("v0=").ok_or_else(|| {
                    malformed(SLACK_SIGNATURE_HEADER, "expected 'v0=' prefix")
                })?;
                Ok(SignedParts { timestamp, signature: signature.to_string() })
            }
            Self::Calendly => {
                let raw = required(headers, CALENDLY_SIGNATURE_HEADER)?;
                let mut timestamp = None;
                let mut signature = None;
                for pair in raw.split(',') {
                    match pair.trim().split_once('=') {
                        Some(("t", value)) => timestamp = Some(value),
                        Some(("v1", value)) => signature = Some(value),
                        _ => {}
                    }
                }
                let timestamp = timestamp
                    .ok_or_else(|| malformed(CALENDLY_SIGNATURE_HEADER, "missing 't=' component"))?;
                let signature = signature
                    .ok_or_else(|| malformed(CALENDLY_SIGNATURE_HEADER, "missing 'v1=' component"))?;
                Ok(SignedParts {
                    timestamp: parse_timestamp(CALENDLY_SIGNATURE_HEADER, timestamp)?,
                    signature: signature.to_string(),
                })
            }
        }
    }

    /// Prefix hashed ahead of the raw body
    pub(crate) fn signing_prefix(self, timestamp: i64) -> String {
        match self {
            Self::Slack => format!("v0:{timestamp}:"),
            Self::Calendly => format!("{timestamp}."),
        }
    }

    /// Header pairs carrying `hex_signature` the way the provider sends them
    pub(crate) fn signature_headers(
        self,
        timestamp: i64,
        hex_signature: &str,
    ) -> Vec<(&'static str, String)> {
        match self {
            Self::Slack => vec![
                (SLACK_TIMESTAMP_HEADER, timestamp.to_string()),
                (SLACK_SIGNATURE_HEADER, format!("v0={hex_signature}")),
            ],
            Self::Calendly => {
                vec![(CALENDLY_SIGNATURE_HEADER, format!("t={timestamp},v1={hex_signature}"))]
            }
        }
    }
}

impl fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// Provider name that is not supported
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown webhook provider '{0}'")]
pub struct UnknownProvider(pub String);

/// Timestamp and signature claimed by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedParts {
    pub timestamp: i64,
    pub signature: String,
}

/// Case-insensitive header view, detached from any HTTP framework
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    entries: Vec<(String, String)>,
}

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.insert(name, value);
        }
        headers
    }

    /// Add a header; an existing value with the same name is replaced.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn required<'h>(headers: &'h WebhookHeaders, name: &str) -> Result<&'h str, WebhookVerificationError> {
    headers
        .get(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WebhookVerificationError::MissingHeader { header: name.to_string() })
}

fn parse_timestamp(header: &str, raw: &str) -> Result<i64, WebhookVerificationError> {
    raw.trim().parse().map_err(|_| malformed(header, "timestamp is not an integer"))
}

fn malformed(header: &str, reason: &str) -> WebhookVerificationError {
    WebhookVerificationError::MalformedHeader {
        header: header.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("slack".parse::<WebhookProvider>().unwrap(), WebhookProvider::Slack);
        assert_eq!("Calendly".parse::<WebhookProvider>().unwrap(), WebhookProvider::Calendly);
        assert!("twilio".parse::<WebhookProvider>().is_err());
        assert_eq!(WebhookProvider::Calendly.to_string(), "calendly");
    }

    #[test]
    fn test_headers_case_insensitive() {
        let headers = WebhookHeaders::from_pairs([
            ("X-Slack-Signature", "v0=abc"),
            ("Content-Type", "application/json"),
            ("x-slack-signature", "v0=def"),
        ]);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-SLACK-SIGNATURE"), Some("v0=def"));
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("missing"), None);
    }

    #[test]
    fn test_slack_extraction() {
        let headers = WebhookHeaders::from_pairs([
            (SLACK_TIMESTAMP_HEADER, "1700000000"),
            (SLACK_SIGNATURE_HEADER, "v0=deadbeef"),
        ]);
        let parts = WebhookProvider::Slack.extract(&headers).unwrap();
        assert_eq!(parts, SignedParts { timestamp: 1_700_000_000, signature: "deadbeef".into() });
    }

    #[test]
    fn test_slack_extraction_failures() {
        let missing_ts = WebhookHeaders::from_pairs([(SLACK_SIGNATURE_HEADER, "v0=aa")]);
        assert!(matches!(
            WebhookProvider::Slack.extract(&missing_ts),
            Err(WebhookVerificationError::MissingHeader { header }) if header == SLACK_TIMESTAMP_HEADER
        ));

        let bad_prefix = WebhookHeaders::from_pairs([
            (SLACK_TIMESTAMP_HEADER, "1700000000"),
            (SLACK_SIGNATURE_HEADER, "sha256=aa"),
        ]);
        assert!(matches!(
            WebhookProvider::Slack.extract(&bad_prefix),
            Err(WebhookVerificationError::MalformedHeader { .. })
        ));

        let bad_ts = WebhookHeaders::from_pairs([
            (SLACK_TIMESTAMP_HEADER, "yesterday"),
            (SLACK_SIGNATURE_HEADER, "v0=aa"),
        ]);
        assert!(matches!(
            WebhookProvider::Slack.extract(&bad_ts),
            Err(WebhookVerificationError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_calendly_extraction() {
        let headers =
            WebhookHeaders::from_pairs([(CALENDLY_SIGNATURE_HEADER, "t=1700000000, v1=cafe")]);
        let parts = WebhookProvider::Calendly.extract(&headers).unwrap();
        assert_eq!(parts.timestamp, 1_700_000_000);
        assert_eq!(parts.signature, "cafe");

        let no_sig = WebhookHeaders::from_pairs([(CALENDLY_SIGNATURE_HEADER, "t=1700000000")]);
        assert!(WebhookProvider::Calendly.extract(&no_sig).is_err());
    }
}
