//! # UGV Harness Core Library
//!
//! Multi-threaded unmanned-ground-vehicle simulation harness. A supervisor
//! starts one thread per functional module; the modules share state through
//! two lock-guarded blocks instead of message passing.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered `HarnessConfig` (defaults, TOML file, `UGV_`
//!   environment variables) and its validation.
//! - **`error`**: `AcquisitionError`, `FrameError` and `HarnessError`, split by
//!   whether the acquisition loop stops, skips a frame, or the process fails.
//! - **`input`**: Operator quit sources (terminal key press or stdin lines).
//! - **`lidar`**: Range-sensor acquisition: framing, parsing, geometry, the
//!   acquisition client, the simulate mode, and a loopback mock sensor.
//! - **`modules`**: The `Module` capability trait, the thread runner, and the
//!   placeholder worker modules.
//! - **`shared`**: `SharedScanBuffer` and `SupervisorState`, the only state
//!   crossing thread boundaries.
//! - **`supervisor`**: Module thread lifecycle and the supervision loop.
//! - **`tracing_setup`**: Structured logging initialization.

pub mod config;
pub mod error;
pub mod input;
pub mod lidar;
pub mod modules;
pub mod shared;
pub mod supervisor;
pub mod tracing_setup;

pub use config::HarnessConfig;
pub use error::{AcquisitionError, AppResult, FrameError, HarnessError};
pub use shared::{ScanSample, SharedScanBuffer, SupervisorState, SCAN_SAMPLES};
pub use supervisor::{Supervisor, SupervisorReport};
