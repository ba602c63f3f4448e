//! Background schedulers
//!
//! - Health probing (`HealthScheduler`)
//! - Event batch flushing (`FlushScheduler`)
//!
//! Both follow the same lifecycle: explicit `start`/`stop`, a join handle for
//! the spawned task, cancellation through a `CancellationToken`, a bounded
//! wait on stop, and `run_once` for a deterministic single round.

pub mod error;
pub mod flush_scheduler;
pub mod health_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use flush_scheduler::{FlushScheduler, FlushSchedulerConfig};
pub use health_scheduler::{HealthScheduler, HealthSchedulerConfig};
