//! JSON integration client for one configured upstream service
//!
//! Composes [`HttpTransport`] (one classified attempt) with
//! [`ResilientClient`] (breaker, timeout, retries). Request builders are
//! rebuilt for every attempt, so bodies are serialised once up front and
//! cloned per attempt.

use std::sync::Arc;

use async_trait::async_trait;
use bulwark_common::resilience::CircuitBreaker;
use bulwark_core::{ClientError, HealthProbe, HealthRegistry, ResilientClient};
use bulwark_domain::{BulwarkError, ServiceConfig};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::http::HttpTransport;

const USER_AGENT: &str = concat!("bulwark/", env!("CARGO_PKG_VERSION"));

/// Resilient JSON client for a single service
#[derive(Debug)]
pub struct ServiceClient {
    transport: HttpTransport,
    resilient: ResilientClient,
    health_path: String,
}

impl ServiceClient {
    /// Build the transport and resilience stack from configuration.
    ///
    /// # Errors
    /// Returns [`BulwarkError::Config`] for an invalid base URL or invalid
    /// resilience settings.
    pub fn from_config(
        config: &ServiceConfig,
        health: Option<Arc<HealthRegistry>>,
    ) -> Result<Self, BulwarkError> {
        let transport = HttpTransport::builder(config.base_url.clone())
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;
        let resilient = ResilientClient::from_config(config, health)?;
        Ok(Self::new(transport, resilient, config.health_path.clone()))
    }

    pub fn new(
        transport: HttpTransport,
        resilient: ResilientClient,
        health_path: impl Into<String>,
    ) -> Self {
        Self { transport, resilient, health_path: health_path.into() }
    }

    pub fn name(&self) -> &str {
        self.resilient.service()
    }

    pub fn resilient(&self) -> &ResilientClient {
        &self.resilient
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// `GET {base_url}{path}` decoded as JSON.
    ///
    /// # Errors
    /// See [`ClientError`].
    #[instrument(skip(self), fields(service = %self.name()))]
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.resilient
            .execute(|| {
                let transport = &self.transport;
                async move { transport.send_json(transport.request(Method::GET, path)?).await }
            })
            .await
    }

    /// `POST {base_url}{path}` with a JSON body, decoding a JSON reply.
    ///
    /// # Errors
    /// See [`ClientError`]. A body that cannot be serialised is reported as
    /// `MalformedResponse` without touching the network.
    #[instrument(skip(self, body), fields(service = %self.name()))]
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|err| ClientError::MalformedResponse {
            service: self.name().to_string(),
            message: format!("request body could not be serialised: {err}"),
        })?;

        self.resilient
            .execute(|| {
                let transport = &self.transport;
                let payload = payload.clone();
                async move {
                    let request = transport
                        .request(Method::POST, path)?
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .body(payload);
                    transport.send_json(request).await
                }
            })
            .await
    }

    /// `DELETE {base_url}{path}`; any 2xx counts as success.
    ///
    /// # Errors
    /// See [`ClientError`].
    #[instrument(skip(self), fields(service = %self.name()))]
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.resilient
            .execute(|| {
                let transport = &self.transport;
                async move { transport.send(transport.request(Method::DELETE, path)?).await.map(|_| ()) }
            })
            .await
    }

    /// Probe that checks `GET {base_url}{health_path}` through this
    /// client's breaker, as a single attempt without retries.
    ///
    /// While the circuit is open the probe fails without a request. Once the
    /// cooldown has passed the probe is admitted as the half-open trial.
    pub fn health_probe(&self) -> HttpHealthProbe {
        HttpHealthProbe {
            transport: self.transport.clone(),
            breaker: Arc::clone(self.resilient.breaker()),
            path: self.health_path.clone(),
        }
    }
}

#[async_trait]
impl HealthProbe for ServiceClient {
    async fn probe(&self) -> Result<(), String> {
        probe_once(&self.transport, self.resilient.breaker(), &self.health_path).await
    }
}

/// Standalone health probe for one service endpoint
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    transport: HttpTransport,
    breaker: Arc<CircuitBreaker>,
    path: String,
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> Result<(), String> {
        probe_once(&self.transport, &self.breaker, &self.path).await
    }
}

async fn probe_once(
    transport: &HttpTransport,
    breaker: &CircuitBreaker,
    path: &str,
) -> Result<(), String> {
    let Some(permit) = breaker.try_acquire() else {
        debug!(breaker = %breaker.name(), "circuit open, probe short-circuited");
        return Err(match breaker.retry_after() {
            Some(wait) => format!("circuit breaker open, next trial in {}ms", wait.as_millis()),
            None => "circuit breaker open".to_string(),
        });
    };

    let outcome = match transport.request(Method::GET, path) {
        Ok(request) => transport.send(request).await.map(|_| ()),
        Err(err) => Err(err),
    };
    match outcome {
        Ok(()) => {
            breaker.record_success_for(&permit);
            Ok(())
        }
        Err(err) => {
            breaker.record_failure_for(&permit);
            Err(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bulwark_common::resilience::CircuitState;
    use bulwark_core::{ServiceRegistration, TransportError};
    use bulwark_domain::HealthStatus;
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Contact {
        id: u64,
        name: String,
    }

    fn config(server: &MockServer) -> ServiceConfig {
        let mut config = ServiceConfig::new("crm", server.uri());
        config.health_path = "/status".into();
        config.failure_threshold = 2;
        config.max_attempts = 3;
        config.initial_delay_ms = 10;
        config.max_delay_ms = 50;
        config.jitter = false;
        config.request_timeout_ms = 2_000;
        config
    }

    #[tokio::test]
    async fn get_json_retries_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/7"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contacts/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7, "name": "Ada" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ServiceClient::from_config(&config(&server), None).unwrap();
        let contact: Contact = client.get_json("/contacts/7").await.unwrap();

        assert_eq!(contact, Contact { id: 7, name: "Ada".into() });
        assert_eq!(client.resilient().breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn post_json_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "name": "Grace" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 8, "name": "Grace" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ServiceClient::from_config(&config(&server), None).unwrap();
        let created: Contact = client.post_json("/contacts", &json!({ "name": "Grace" })).await.unwrap();
        assert_eq!(created.id, 8);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/contacts/9"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = ServiceClient::from_config(&config(&server), None).unwrap();
        let err = client.delete("/contacts/9").await.unwrap_err();
        assert!(matches!(err, ClientError::ClientRequest { status: 404, .. }));
    }

    /// Validates the breaker opens after repeated exhausted calls and then
    /// short-circuits without reaching the server.
    #[tokio::test]
    async fn outage_opens_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(6)
            .mount(&server)
            .await;

        let registry = Arc::new(HealthRegistry::new());
        registry.register_with(ServiceRegistration::new("crm"));
        let client = ServiceClient::from_config(&config(&server), Some(registry.clone())).unwrap();

        for _ in 0..2 {
            let err = client.get_json::<Contact>("/contacts").await.unwrap_err();
            assert!(matches!(
                err,
                ClientError::Exhausted { attempts: 3, last_error: TransportError::Server { status: 500, .. }, .. }
            ));
        }

        let err = client.get_json::<Contact>("/contacts").await.unwrap_err();
        assert!(matches!(err, ClientError::CircuitOpen { .. }));
        assert_eq!(registry.service("crm").unwrap().status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn health_probe_hits_health_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let client = ServiceClient::from_config(&config(&server), None).unwrap();
        assert_eq!(client.probe().await, Ok(()));
        assert_eq!(client.health_probe().probe().await, Ok(()));
    }

    #[tokio::test]
    async fn failing_probe_reports_error_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ServiceClient::from_config(&config(&server), None).unwrap();
        let registry = HealthRegistry::new();
        registry.register("crm", Arc::new(client.health_probe()));

        let results = registry.probe_all(Duration::from_secs(2), Duration::from_secs(1)).await;
        assert_eq!(results.len(), 1);
        let record = registry.service("crm").unwrap();
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert!(record.last_error.unwrap().contains("503"));
        assert_eq!(client.resilient().breaker().metrics().consecutive_failures, 1);
    }

    /// Validates that a probe round cannot report an open circuit healthy.
    ///
    /// Assertions:
    /// - The health endpoint is not called while the circuit is open.
    /// - The record stays unhealthy and readiness stays false.
    #[tokio::test]
    async fn open_circuit_stays_unhealthy_across_health_round() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.failure_threshold = 1;
        config.max_attempts = 1;
        let registry = Arc::new(HealthRegistry::new());
        let client = ServiceClient::from_config(&config, Some(registry.clone())).unwrap();
        registry.register("crm", Arc::new(client.health_probe()));

        client.get_json::<Contact>("/contacts").await.unwrap_err();
        assert_eq!(client.resilient().breaker().state(), CircuitState::Open);
        assert!(!registry.is_ready());

        let results = registry.probe_all(Duration::from_secs(2), Duration::from_secs(1)).await;
        assert_eq!(results.len(), 1);
        let record = registry.service("crm").unwrap();
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert!(record.last_error.unwrap().contains("circuit breaker open"));
        assert_eq!(client.resilient().breaker().state(), CircuitState::Open);
        assert!(!registry.is_ready());
    }

    /// Validates that after the cooldown the probe is the half-open trial
    /// and a healthy answer closes the circuit.
    #[tokio::test]
    async fn health_round_closes_circuit_after_cooldown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.failure_threshold = 1;
        config.max_attempts = 1;
        config.reset_timeout_ms = 100;
        let registry = Arc::new(HealthRegistry::new());
        let client = ServiceClient::from_config(&config, Some(registry.clone())).unwrap();
        registry.register("crm", Arc::new(client.health_probe()));

        client.get_json::<Contact>("/contacts").await.unwrap_err();
        assert!(!registry.is_ready());

        tokio::time::sleep(Duration::from_millis(150)).await;
        registry.probe_all(Duration::from_secs(2), Duration::from_secs(1)).await;

        assert_eq!(client.resilient().breaker().state(), CircuitState::Closed);
        assert_eq!(registry.service("crm").unwrap().status, HealthStatus::Healthy);
        assert!(registry.is_ready());
    }
}
