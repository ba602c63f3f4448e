//! Resilient outbound client core

pub mod error;
pub mod resilient;

pub use error::{ClientError, TransportError};
pub use resilient::ResilientClient;
