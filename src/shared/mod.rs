//! Lock-guarded state shared by the module threads.
//!
//! Two independent blocks, each behind its own lock:
//!
//! - [`SharedScanBuffer`]: the latest Cartesian scan, written only by the
//!   acquisition client.
//! - [`SupervisorState`]: the shutdown flag and the heartbeat mask.
//!
//! Both are cheap `Arc` handles injected into every module at construction.
//! Neither lock is held across a blocking call.

pub mod heartbeat;
pub mod scan_buffer;
pub mod supervisor_state;

pub use heartbeat::{HeartbeatMask, ModuleId};
pub use scan_buffer::{Scan, ScanSample, ScanSnapshot, SharedScanBuffer, SCAN_SAMPLES};
pub use supervisor_state::SupervisorState;
