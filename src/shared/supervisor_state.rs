//! Process-wide shutdown flag and heartbeat mask.

use super::heartbeat::{HeartbeatMask, ModuleId};
use parking_lot::Mutex;
use std::sync::Arc;

/// Value written to the shutdown byte by the supervisor.
pub const SHUTDOWN_REQUESTED: u8 = 0xFF;

#[derive(Debug, Default)]
struct ControlBlock {
    /// 0 = running, anything else = stop. Never reset within a session.
    shutdown: u8,
    heartbeat: HeartbeatMask,
}

/// Shared handle to the supervisor control block.
///
/// Cloning yields another handle to the same block. One lock covers both the
/// shutdown byte and the heartbeat mask, and it is only ever held for the
/// duration of a single read or update.
#[derive(Debug, Clone, Default)]
pub struct SupervisorState {
    inner: Arc<Mutex<ControlBlock>>,
}

impl SupervisorState {
    /// Create a fresh control block: running, no heartbeats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every module to stop. Idempotent.
    pub fn request_shutdown(&self) {
        let mut block = self.inner.lock();
        block.shutdown = SHUTDOWN_REQUESTED;
    }

    /// Whether shutdown has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.inner.lock().shutdown != 0
    }

    /// Set `module`'s heartbeat bit.
    pub fn beat(&self, module: ModuleId) {
        let mut block = self.inner.lock();
        block.heartbeat |= module.bit();
    }

    /// Current heartbeat mask.
    pub fn heartbeats(&self) -> HeartbeatMask {
        self.inner.lock().heartbeat
    }

    /// Reset the heartbeat mask and return what it held.
    ///
    /// Only the supervisor calls this.
    pub fn clear_heartbeats(&self) -> HeartbeatMask {
        let mut block = self.inner.lock();
        std::mem::take(&mut block.heartbeat)
    }
}
