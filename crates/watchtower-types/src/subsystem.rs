//! Lifecycle contract shared by all monitoring subsystems.

use crate::errors::SubsystemError;
use async_trait::async_trait;

/// The contract every monitoring subsystem implements.
///
/// The orchestrator owns a set of subsystems, starts the enabled ones,
/// and stops them all in reverse order on shutdown. Disabled subsystems
/// are constructed but never started.
#[async_trait]
pub trait Subsystem: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the subsystem is switched on in the active configuration.
    fn is_enabled(&self) -> bool;

    /// Bring the subsystem online.
    async fn start(&self) -> Result<(), SubsystemError>;

    /// Shut the subsystem down, releasing its tasks.
    async fn stop(&self) -> Result<(), SubsystemError>;
}
