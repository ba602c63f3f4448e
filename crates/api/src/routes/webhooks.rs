//! Inbound webhook endpoint guarded by signature verification

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bulwark_core::{url_verification_challenge, WebhookHeaders, WebhookProvider};
use serde_json::json;
use tracing::{debug, info};

use crate::context::AppContext;

pub fn routes() -> Router<Arc<AppContext>> {
    Router::new().route("/webhooks/{provider}", post(receive))
}

async fn receive(
    State(ctx): State<Arc<AppContext>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(provider) = provider.parse::<WebhookProvider>() else {
        debug!(provider = %provider, "webhook for unknown provider");
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response();
    };

    if let Some(challenge) = url_verification_challenge(provider, &body) {
        info!(provider = %provider, "answered url verification challenge");
        return Json(json!({ "challenge": challenge })).into_response();
    }

    let headers = webhook_headers(&headers);
    let verification = ctx.guard.verify(provider, &headers, &body);
    ctx.batcher.enqueue(verification.security_event());

    match verification.outcome() {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => {
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "error": err.public_message() }))).into_response()
        }
    }
}

/// Headers with non-UTF-8 values are skipped; the guard reports them missing.
fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    WebhookHeaders::from_pairs(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v.to_string()))),
    )
}
