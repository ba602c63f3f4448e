//! Shared helpers for in-process router tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use bulwark_core::MemoryEventSink;
use bulwark_domain::{AppConfig, ServiceConfig};
use bulwark_server::{router, AppContext};
use serde_json::Value;
use tower::ServiceExt;

pub const SLACK_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

/// Context for a slack integration (non-critical, with a signing secret)
/// and a critical crm service. Nothing is probed over the network.
pub fn test_context() -> (Arc<AppContext>, Arc<MemoryEventSink>) {
    let mut slack = ServiceConfig::new("slack", "https://slack.com/api");
    slack.critical = false;
    slack.webhook_secret = Some(SLACK_SECRET.into());
    let crm = ServiceConfig::new("crm", "https://crm.example.com");

    let config = AppConfig { services: vec![slack, crm], ..AppConfig::default() };
    let sink = Arc::new(MemoryEventSink::new());
    let context = AppContext::with_sink(config, sink.clone()).expect("context builds");
    (Arc::new(context), sink)
}

/// Send one request through a fresh router and decode the JSON body.
pub async fn send(context: &Arc<AppContext>, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(context.clone()).oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body readable");
    let body = serde_json::from_slice(&bytes).expect("JSON body");
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("valid request")
}
