//! Host-platform timer bridge.
//!
//! Enforcement of the budget (locking the device, surfacing the countdown)
//! lives in the host platform, behind an opaque fallible call. The service
//! pushes every committed status across this boundary; a rejected push is
//! reported and retried on the next transition, never trusted blindly.

use super::snapshot::TimerStatus;
use crate::error::CoreError;

/// Capability interface to the host platform's timer surface.
pub trait HostBridge: Send + Sync {
    /// Push a committed status to the host.
    ///
    /// # Errors
    /// Any error means the host did not acknowledge the state; the caller
    /// retries on the next committed transition.
    fn sync_state(&self, status: &TimerStatus) -> Result<(), CoreError>;
}

/// Bridge that acknowledges everything. Default for tests and headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBridge;

impl HostBridge for NoopBridge {
    fn sync_state(&self, _status: &TimerStatus) -> Result<(), CoreError> {
        Ok(())
    }
}
