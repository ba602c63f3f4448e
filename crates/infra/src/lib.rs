//! # Bulwark Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The reqwest HTTP transport and its error classification
//! - `ServiceClient`, the JSON integration client and health probe
//! - Background schedulers for health probing and event flushing
//! - The tracing event sink
//! - Configuration loading from the environment and files
//!
//! ## Architecture
//! - Implements traits defined in `bulwark-core`
//! - Depends on `bulwark-common`, `bulwark-domain` and `bulwark-core`
//! - Contains all "impure" code (network I/O, timers, environment)

pub mod config;
pub mod errors;
pub mod events;
pub mod http;
pub mod integrations;
pub mod scheduling;

// Re-export commonly used items
pub use errors::InfraError;
pub use events::TracingEventSink;
pub use http::{HttpTransport, HttpTransportBuilder};
pub use integrations::{HttpHealthProbe, ServiceClient};
pub use scheduling::{
    FlushScheduler, FlushSchedulerConfig, HealthScheduler, HealthSchedulerConfig, SchedulerError,
};
