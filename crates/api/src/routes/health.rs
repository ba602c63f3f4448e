//! Health endpoints backed by the health registry

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bulwark_common::resilience::CircuitBreakerMetrics;
use bulwark_domain::HealthStatus;
use chrono::Utc;
use serde_json::json;

use crate::context::{AppContext, VERSION};

pub fn routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/health", get(liveness))
        .route("/health/live", get(live))
        .route("/health/ready", get(readiness))
        .route("/health/detailed", get(detailed))
        .route("/health/services", get(services))
        .route("/health/services/{name}", get(service))
}

/// Liveness: 200 for as long as the process can answer
async fn liveness(State(ctx): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "uptime_secs": ctx.uptime().as_secs(),
        "version": VERSION,
    }))
}

async fn live() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness(State(ctx): State<Arc<AppContext>>) -> Response {
    let snapshot = ctx.registry.snapshot();
    if snapshot.overall.is_unhealthy() {
        let body = json!({
            "status": "not ready",
            "reason": "System unhealthy",
            "unhealthy_services": snapshot.unhealthy_services(),
        });
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    }
    Json(json!({ "status": "ready" })).into_response()
}

async fn detailed(State(ctx): State<Arc<AppContext>>) -> Response {
    let snapshot = ctx.registry.snapshot();
    let breakers: BTreeMap<&str, CircuitBreakerMetrics> = ctx
        .clients
        .iter()
        .map(|(name, client)| (name.as_str(), client.resilient().breaker().metrics()))
        .collect();

    let body = json!({
        "status": snapshot.overall,
        "timestamp": snapshot.generated_at,
        "uptime_secs": ctx.uptime().as_secs(),
        "version": VERSION,
        "services": snapshot.services,
        "breakers": breakers,
        "buffered_events": ctx.batcher.len(),
        "dropped_events": ctx.batcher.dropped_total(),
    });
    (status_code(snapshot.overall), Json(body)).into_response()
}

async fn services(State(ctx): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    let snapshot = ctx.registry.snapshot();
    Json(json!({
        "status": snapshot.overall,
        "timestamp": snapshot.generated_at,
        "services": snapshot.services,
    }))
}

async fn service(State(ctx): State<Arc<AppContext>>, Path(name): Path<String>) -> Response {
    match ctx.registry.service(&name) {
        Some(record) => (status_code(record.status), Json(record)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Service not found", "service": name })),
        )
            .into_response(),
    }
}

fn status_code(status: HealthStatus) -> StatusCode {
    if status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}
