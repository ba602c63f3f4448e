//! Event sink adapters

pub mod tracing_sink;

pub use tracing_sink::{TracingEventSink, EVENT_LOG_TARGET};
