//! Time utilities
//!
//! - **[`clock`]**: `Clock` abstraction with system and mock implementations

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
