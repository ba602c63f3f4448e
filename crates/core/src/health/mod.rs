//! Per-service health tracking and aggregation

pub mod ports;
pub mod registry;

pub use ports::HealthProbe;
pub use registry::{HealthRegistry, HealthSample, RegistryTransitionListener, ServiceRegistration};
