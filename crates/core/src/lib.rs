//! # Bulwark Core
//!
//! Resilience and trust logic with no HTTP client, server or scheduler code.
//!
//! This crate contains:
//! - The resilient outbound call executor (`client`)
//! - Health registry and aggregation (`health`)
//! - Webhook signature and replay verification (`webhooks`)
//! - Event batching and threshold alerts (`events`)
//!
//! ## Architecture Principles
//! - Only depends on `bulwark-common` and `bulwark-domain`
//! - Transports, probes and sinks come in through traits
//! - Time comes in through `Clock`, so every state machine is testable

pub mod client;
pub mod events;
pub mod health;
pub mod webhooks;

pub use client::{ClientError, ResilientClient, TransportError};
pub use events::{
    BatcherConfig, EventBatcher, EventSink, FlushReport, MemoryEventSink, SinkFlushError,
    ThresholdMonitor, ThresholdRule,
};
pub use health::{
    HealthProbe, HealthRegistry, HealthSample, RegistryTransitionListener, ServiceRegistration,
};
pub use webhooks::{
    url_verification_challenge, VerificationStage, WebhookGuard, WebhookHeaders, WebhookProvider,
    WebhookSecrets, WebhookVerificationContext, WebhookVerificationError,
};
