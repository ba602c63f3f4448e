//! Upstream service integrations

pub mod service_client;

pub use service_client::{HttpHealthProbe, ServiceClient};
