//! Module lifecycle: start one named thread per module, supervise, join.
//!
//! The supervisor owns the two shared blocks and hands clones of them to each
//! module at construction. Its loop polls the operator quit source, resets
//! the heartbeat mask, and watches the acquisition thread; on quit it sets the
//! shutdown flag and joins every module thread.

use crate::config::{AcquisitionExitPolicy, HarnessConfig};
use crate::error::{AppResult, HarnessError};
use crate::input::QuitSource;
use crate::lidar::AcquisitionClient;
use crate::modules::{run_module, Module, ModuleExit, WorkerModule};
use crate::shared::{HeartbeatMask, ModuleId, SharedScanBuffer, SupervisorState};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{error, info, trace, warn};

/// How a module thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Returned from the runner
    Exited(ModuleExit),
    /// The thread panicked
    Panicked,
}

/// Why supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The operator pressed the quit key
    Operator,
    /// Shutdown was already requested by another source (e.g. Ctrl-C)
    External,
    /// The acquisition thread ended and policy says to stop
    AcquisitionExit,
}

/// Summary of a supervised run.
#[derive(Debug, Clone)]
pub struct SupervisorReport {
    /// Why the loop ended
    pub reason: StopReason,
    /// Supervisor cycles completed
    pub cycles: u64,
    /// Union of every heartbeat mask cleared during the run
    pub heartbeats_seen: HeartbeatMask,
    /// Whether the acquisition thread ended before shutdown
    pub acquisition_exited_early: bool,
    /// Final status of every module, in start order
    pub modules: Vec<(ModuleId, ModuleStatus)>,
}

impl SupervisorReport {
    /// Status of one module.
    pub fn status(&self, id: ModuleId) -> Option<ModuleStatus> {
        self.modules
            .iter()
            .find_map(|(module, status)| (*module == id).then_some(*status))
    }
}

/// Handles of the started module threads.
#[derive(Debug)]
pub struct RunningModules {
    handles: Vec<(ModuleId, JoinHandle<ModuleExit>)>,
}

impl RunningModules {
    /// Whether `id`'s thread has returned.
    pub fn is_finished(&self, id: ModuleId) -> bool {
        self.handles
            .iter()
            .any(|(module, handle)| *module == id && handle.is_finished())
    }

    /// Join every thread. Call only after shutdown has been requested.
    pub fn join_all(self) -> Vec<(ModuleId, ModuleStatus)> {
        self.handles
            .into_iter()
            .map(|(id, handle)| {
                let status = match handle.join() {
                    Ok(exit) => ModuleStatus::Exited(exit),
                    Err(_) => {
                        error!(module = %id, "module thread panicked");
                        ModuleStatus::Panicked
                    }
                };
                (id, status)
            })
            .collect()
    }
}

/// Harness supervisor.
#[derive(Debug)]
pub struct Supervisor {
    config: HarnessConfig,
    state: SupervisorState,
    scans: SharedScanBuffer,
}

impl Supervisor {
    /// Supervisor with fresh shared state.
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            state: SupervisorState::new(),
            scans: SharedScanBuffer::new(),
        }
    }

    /// Handle to the shutdown flag and heartbeat mask.
    pub fn state(&self) -> SupervisorState {
        self.state.clone()
    }

    /// Handle to the shared scan buffer.
    pub fn scans(&self) -> SharedScanBuffer {
        self.scans.clone()
    }

    fn modules(&self) -> Vec<Box<dyn Module>> {
        let mut modules: Vec<Box<dyn Module>> = vec![Box::new(AcquisitionClient::new(
            self.config.lidar.clone(),
            self.scans.clone(),
            self.state.clone(),
        ))];
        modules.extend(
            WorkerModule::placeholders(&self.config.modules, &self.state, &self.scans)
                .into_iter()
                .map(|m| Box::new(m) as Box<dyn Module>),
        );
        modules
    }

    /// Start every module on its own named thread.
    ///
    /// If a thread cannot be spawned, the ones already running are shut down
    /// and joined before the error is returned.
    pub fn start(&self) -> AppResult<RunningModules> {
        let mut running = RunningModules {
            handles: Vec::new(),
        };
        for module in self.modules() {
            let id = module.id();
            let spawned = thread::Builder::new()
                .name(id.name().to_string())
                .spawn(move || run_module(module));
            match spawned {
                Ok(handle) => running.handles.push((id, handle)),
                Err(source) => {
                    self.state.request_shutdown();
                    running.join_all();
                    return Err(HarnessError::ThreadSpawn {
                        module: id.name(),
                        source,
                    });
                }
            }
        }
        info!(modules = running.handles.len(), "all modules started");
        Ok(running)
    }

    /// Start the modules, supervise until quit, and join them.
    pub fn run(&self, quit: &mut dyn QuitSource) -> AppResult<SupervisorReport> {
        let running = self.start()?;
        self.supervise(running, quit)
    }

    /// Supervise already started modules until quit, then join them.
    pub fn supervise(
        &self,
        running: RunningModules,
        quit: &mut dyn QuitSource,
    ) -> AppResult<SupervisorReport> {
        let poll = self.config.supervisor.poll_interval();
        let policy = self.config.supervisor.on_acquisition_exit;

        let mut cycles = 0u64;
        let mut heartbeats_seen = HeartbeatMask::empty();
        let mut acquisition_exited_early = false;
        let mut failure = None;

        let reason = loop {
            if self.state.shutdown_requested() {
                break StopReason::External;
            }
            match quit.poll_quit(poll) {
                Ok(true) => break StopReason::Operator,
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, "operator input failed, shutting down");
                    failure = Some(e);
                    break StopReason::External;
                }
            }

            let mask = self.state.clear_heartbeats();
            heartbeats_seen |= mask;
            trace!(mask = mask.bits(), missing = ?mask.missing(), "heartbeats");

            if !acquisition_exited_early && running.is_finished(ModuleId::Lidar) {
                acquisition_exited_early = true;
                match policy {
                    AcquisitionExitPolicy::Log => {
                        warn!("acquisition thread has exited; other modules keep running")
                    }
                    AcquisitionExitPolicy::Shutdown => {
                        error!("acquisition thread has exited; shutting down");
                        break StopReason::AcquisitionExit;
                    }
                }
            }
            cycles += 1;
        };

        info!(?reason, "shutdown requested");
        self.state.request_shutdown();
        let shutdown_started = Instant::now();
        let modules = running.join_all();
        // Beats from the final cycles
        heartbeats_seen |= self.state.clear_heartbeats();
        info!(
            elapsed_ms = shutdown_started.elapsed().as_millis() as u64,
            "all modules joined"
        );

        if let Some(e) = failure {
            return Err(e);
        }
        Ok(SupervisorReport {
            reason,
            cycles,
            heartbeats_seen,
            acquisition_exited_early,
            modules,
        })
    }
}
