//! # Bulwark Server
//!
//! axum application layer - HTTP routes and dependency wiring.
//!
//! This crate contains:
//! - Health and webhook routes
//! - Application context (dependency injection)
//! - Logging setup for the `bulwark` binary
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod context;
pub mod routes;
pub mod utils;

// Re-export for convenience
pub use context::AppContext;
pub use routes::router;
