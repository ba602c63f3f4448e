use std::time::Duration;

use bulwark_core::TransportError;
use bulwark_domain::BulwarkError;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::errors::conversions::{classify_http_error, status_message};
use crate::errors::InfraError;

/// Longest error body kept in a [`TransportError`] message
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Single-attempt HTTP transport for one upstream service.
///
/// Every failure is classified into a [`TransportError`] here, at its
/// origin. Retries, timeouts across attempts and breaker gating belong to
/// [`ResilientClient`](bulwark_core::ResilientClient).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    base_url: Url,
}

impl HttpTransport {
    /// Start building a transport rooted at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL by appending it.
    ///
    /// `https://api.example.com/v1` + `/users` gives
    /// `https://api.example.com/v1/users`.
    ///
    /// # Errors
    /// Returns [`TransportError::Client`] with status 0 for unparsable paths.
    pub fn url(&self, path: &str) -> Result<Url, TransportError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined).map_err(|err| TransportError::Client {
            status: 0,
            message: format!("invalid request path '{path}': {err}"),
        })
    }

    /// Create a request builder for `path` on this service.
    ///
    /// # Errors
    /// See [`url`](Self::url).
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, TransportError> {
        Ok(self.client.request(method, self.url(path)?))
    }

    /// Send once. Non-2xx responses become errors.
    ///
    /// # Errors
    /// - `Timeout` / `Connection` when no response arrived
    /// - `RateLimited` for 429, carrying `Retry-After` when present
    /// - `Server` for 5xx and `Client` for other 4xx
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let request = builder.build().map_err(|err| classify_http_error(&err))?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        let response = self.client.execute(request).await.map_err(|err| {
            debug!(%method, %url, error = %err, "HTTP request failed");
            classify_http_error(&err)
        })?;

        let status = response.status();
        debug!(%method, %url, %status, "received HTTP response");
        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            let retry_after = retry_after_from_headers(response.headers(), Utc::now());
            return Err(TransportError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status_message(status)
        } else {
            format!("{}: {}", status_message(status), truncate(body.trim(), MAX_ERROR_BODY_CHARS))
        };
        Err(TransportError::from_status(status.as_u16(), message))
    }

    /// Send once and decode a JSON body.
    ///
    /// # Errors
    /// As [`send`](Self::send), plus `Malformed` when the body does not decode.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await.map_err(|err| classify_http_error(&err))?;
        serde_json::from_slice(&bytes).map_err(|err| TransportError::Malformed(err.to_string()))
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl HttpTransportBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            user_agent: None,
            default_headers: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// # Errors
    /// Returns [`BulwarkError::Config`] for an unparsable or non-HTTP base
    /// URL, or when the underlying client cannot be built.
    pub fn build(self) -> Result<HttpTransport, BulwarkError> {
        let base_url = Url::parse(self.base_url.trim()).map_err(|err| {
            BulwarkError::Config(format!("invalid base URL '{}': {err}", self.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BulwarkError::Config(format!(
                "base URL '{}' must use http or https",
                self.base_url
            )));
        }

        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| BulwarkError::from(InfraError::from(err)))?;
        Ok(HttpTransport { client, base_url })
    }
}

/// Parse `Retry-After` as delta-seconds or an HTTP date.
///
/// Dates in the past give a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn retry_after_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    headers.get(RETRY_AFTER)?.to_str().ok().and_then(|value| parse_retry_after(value, now))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        ok: bool,
    }

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::builder(format!("{}/api", server.uri()))
            .timeout(Duration::from_secs(2))
            .build()
            .expect("http transport")
    }

    #[test]
    fn joins_paths_onto_base() {
        let transport = HttpTransport::builder("https://crm.example.com/v1/").build().unwrap();
        assert_eq!(transport.url("/users").unwrap().as_str(), "https://crm.example.com/v1/users");
        assert_eq!(transport.url("users").unwrap().as_str(), "https://crm.example.com/v1/users");
        assert_eq!(transport.url("").unwrap().as_str(), "https://crm.example.com/v1");
    }

    #[test]
    fn rejects_invalid_base_urls() {
        assert!(matches!(
            HttpTransport::builder("not a url").build(),
            Err(BulwarkError::Config(_))
        ));
        assert!(matches!(
            HttpTransport::builder("ftp://files.example.com").build(),
            Err(BulwarkError::Config(_))
        ));
    }

    #[test]
    fn parses_retry_after_forms() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();
        assert_eq!(parse_retry_after("7", now), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(60))
        );
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[tokio::test]
    async fn decodes_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server);
        let pong: Pong =
            transport.send_json(transport.request(Method::GET, "/ping").unwrap()).await.unwrap();
        assert_eq!(pong, Pong { ok: true });
    }

    #[tokio::test]
    async fn classifies_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(path("/api/down"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        Mock::given(path("/api/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/api/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let send = |p: &'static str| {
            let transport = transport.clone();
            async move { transport.send(transport.request(Method::GET, p).unwrap()).await }
        };

        match send("/down").await.unwrap_err() {
            TransportError::Server { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("bad gateway"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
        assert!(matches!(
            send("/missing").await.unwrap_err(),
            TransportError::Client { status: 404, .. }
        ));
        assert_eq!(
            send("/busy").await.unwrap_err(),
            TransportError::RateLimited { retry_after: Some(Duration::from_secs(7)) }
        );
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let result: Result<Pong, _> =
            transport.send_json(transport.request(Method::GET, "/ping").unwrap()).await;
        assert!(matches!(result, Err(TransportError::Malformed(_))));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = HttpTransport::builder(server.uri())
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let result = transport.send(transport.request(Method::GET, "/").unwrap()).await;
        assert_eq!(result.unwrap_err(), TransportError::Timeout);
    }
}
