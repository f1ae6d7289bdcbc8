//! Module system for the harness threads.
//!
//! Every functional module runs on its own OS thread and implements [`Module`]:
//! a single cycle of work plus a view of the shared shutdown flag. The
//! runner owns the loop, so the cancellation rule lives in one place:
//!
//! ```text
//! start ──> shutdown_observed()? ──yes──> finish() ──> ModuleExit::Shutdown
//!               │ no
//!               ↓
//!           run_cycle() ──Stop──> finish() ──> ModuleExit::Stopped
//!               │ Continue
//!               └──────────> (next cycle)
//! ```
//!
//! Cancellation is cooperative. A cycle that is blocked (a sleep, a socket
//! read) completes before the flag is seen again.
//!
//! # Example
//!
//! ```rust
//! use ugv_harness::modules::{run_module, CycleOutcome, Module, ModuleExit};
//! use ugv_harness::shared::{ModuleId, SupervisorState};
//!
//! struct Countdown {
//!     state: SupervisorState,
//!     left: u32,
//! }
//!
//! impl Module for Countdown {
//!     fn id(&self) -> ModuleId { ModuleId::Gnss }
//!     fn shutdown_observed(&self) -> bool { self.state.shutdown_requested() }
//!     fn run_cycle(&mut self) -> CycleOutcome {
//!         self.left -= 1;
//!         if self.left == 0 { CycleOutcome::Stop } else { CycleOutcome::Continue }
//!     }
//! }
//!
//! let module = Countdown { state: SupervisorState::new(), left: 3 };
//! assert_eq!(run_module(Box::new(module)), ModuleExit::Stopped);
//! ```

pub mod worker;

pub use worker::WorkerModule;

use crate::shared::ModuleId;
use tracing::info;

/// Result of one module cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Run another cycle unless shutdown was requested
    Continue,
    /// The module has ended on its own
    Stop,
}

/// Why a module thread returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleExit {
    /// The shutdown flag was observed
    Shutdown,
    /// The module stopped itself before shutdown (e.g. a dead connection)
    Stopped,
}

/// Capability shared by every module thread body.
pub trait Module: Send {
    /// Identity used for the heartbeat bit, thread name, and logs.
    fn id(&self) -> ModuleId;

    /// Whether the shared shutdown flag is set.
    fn shutdown_observed(&self) -> bool;

    /// Perform one unit of work, including the module's pacing sleep.
    fn run_cycle(&mut self) -> CycleOutcome;

    /// Release resources once the loop has ended.
    fn finish(&mut self) {}
}

/// Drive `module` until shutdown is observed or it stops itself.
pub fn run_module(mut module: Box<dyn Module>) -> ModuleExit {
    let id = module.id();
    info!(module = %id, "module started");

    let exit = loop {
        if module.shutdown_observed() {
            break ModuleExit::Shutdown;
        }
        if module.run_cycle() == CycleOutcome::Stop {
            break ModuleExit::Stopped;
        }
    };

    module.finish();
    info!(module = %id, ?exit, "module exited");
    exit
}
