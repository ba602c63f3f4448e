//! Domain types and models

pub mod events;
pub mod health;

pub use events::{Alert, BufferedEvent, EventKind, Severity};
pub use health::{HealthSnapshot, HealthStatus, ServiceHealthRecord};
