//! HTTP routes

pub mod health;
pub mod webhooks;

use std::sync::Arc;

use axum::Router;

use crate::context::AppContext;

/// Full application router with state attached
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new().merge(health::routes()).merge(webhooks::routes()).with_state(context)
}
