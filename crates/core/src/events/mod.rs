//! Security/monitoring event buffering and threshold alerts

pub mod alerts;
pub mod batcher;
pub mod memory;
pub mod ports;

pub use alerts::{ThresholdMonitor, ThresholdRule};
pub use batcher::{BatcherConfig, EventBatcher, FlushReport};
pub use memory::MemoryEventSink;
pub use ports::{EventSink, SinkFlushError};
