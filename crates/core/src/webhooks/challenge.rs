//! Setup handshakes answered before signature enforcement
//!
//! Only Slack's `url_verification` payload qualifies, and only in its exact
//! documented shape. Anything else goes through full verification.

use bulwark_domain::constants::MAX_CHALLENGE_LENGTH;
use serde_json::Value;

use super::provider::WebhookProvider;

const CHALLENGE_KEYS: [&str; 3] = ["type", "token", "challenge"];

/// Return the challenge token to echo if `raw_body` is a URL verification
/// handshake for `provider`.
pub fn url_verification_challenge(provider: WebhookProvider, raw_body: &[u8]) -> Option<String> {
    if provider != WebhookProvider::Slack {
        return None;
    }

    let value: Value = serde_json::from_slice(raw_body).ok()?;
    let object = value.as_object()?;

    if object.keys().any(|key| !CHALLENGE_KEYS.contains(&key.as_str())) {
        return None;
    }
    if object.get("type")?.as_str()? != "url_verification" {
        return None;
    }
    if let Some(token) = object.get("token") {
        token.as_str()?;
    }

    let challenge = object.get("challenge")?.as_str()?;
    if challenge.is_empty() || challenge.chars().count() > MAX_CHALLENGE_LENGTH {
        return None;
    }
    Some(challenge.to_string())
}
