//! Health probe port

use async_trait::async_trait;

/// Liveness check for one external dependency.
///
/// Implementations should be cheap and side-effect free; the registry wraps
/// every call in its own timeout and measures latency itself.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(())` if the dependency answered, `Err(reason)` otherwise
    async fn probe(&self) -> Result<(), String>;
}
