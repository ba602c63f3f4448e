//! HTTP transport

pub mod client;

pub use client::{parse_retry_after, HttpTransport, HttpTransportBuilder};
