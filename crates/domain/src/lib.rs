//! # Bulwark Domain
//!
//! Shared data model for the Bulwark integration layer.
//!
//! This crate contains:
//! - Health types (`HealthStatus`, `ServiceHealthRecord`, `HealthSnapshot`)
//! - Event and alert types consumed by the batcher
//! - Configuration structures and defaults
//! - The crate-crossing error type and `Result` alias
//!
//! ## Architecture
//! - No dependencies on other Bulwark crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
