//! Placeholder modules: display, GNSS, controller, vehicle control and crash
//! avoidance.
//!
//! Each one announces liveness and sleeps its own interval. The display module
//! additionally copies the shared scan under its lock and reports fresh
//! sequence numbers; it renders nothing.

use super::{CycleOutcome, Module};
use crate::config::ModuleIntervals;
use crate::shared::{
    scan_buffer::range_extent, ModuleId, Scan, ScanSample, SharedScanBuffer, SupervisorState,
    SCAN_SAMPLES,
};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Read-only view of the shared scan held by the display module.
#[derive(Debug)]
struct ScanReader {
    scans: SharedScanBuffer,
    scratch: Box<Scan>,
    last_sequence: u64,
}

/// Heartbeat-and-sleep module body.
#[derive(Debug)]
pub struct WorkerModule {
    id: ModuleId,
    interval: Duration,
    supervisor: SupervisorState,
    reader: Option<ScanReader>,
    cycles: u64,
}

impl WorkerModule {
    /// Worker for `id` that sleeps `interval` per cycle.
    pub fn new(id: ModuleId, interval: Duration, supervisor: SupervisorState) -> Self {
        Self {
            id,
            interval,
            supervisor,
            reader: None,
            cycles: 0,
        }
    }

    /// Also read the shared scan each cycle.
    pub fn with_scan_reader(mut self, scans: SharedScanBuffer) -> Self {
        self.reader = Some(ScanReader {
            scans,
            scratch: Box::new([ScanSample::default(); SCAN_SAMPLES]),
            last_sequence: 0,
        });
        self
    }

    /// Every non-acquisition module with its configured interval.
    pub fn placeholders(
        intervals: &ModuleIntervals,
        supervisor: &SupervisorState,
        scans: &SharedScanBuffer,
    ) -> Vec<WorkerModule> {
        let ms = Duration::from_millis;
        vec![
            WorkerModule::new(ModuleId::Display, ms(intervals.display_ms), supervisor.clone())
                .with_scan_reader(scans.clone()),
            WorkerModule::new(ModuleId::Gnss, ms(intervals.gnss_ms), supervisor.clone()),
            WorkerModule::new(
                ModuleId::Controller,
                ms(intervals.controller_ms),
                supervisor.clone(),
            ),
            WorkerModule::new(
                ModuleId::VehicleControl,
                ms(intervals.vehicle_control_ms),
                supervisor.clone(),
            ),
            WorkerModule::new(
                ModuleId::CrashAvoidance,
                ms(intervals.crash_avoidance_ms),
                supervisor.clone(),
            ),
        ]
    }

    /// Cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Sequence of the last scan the display module saw (0 if none or not a reader).
    pub fn last_sequence(&self) -> u64 {
        self.reader.as_ref().map_or(0, |r| r.last_sequence)
    }

    fn observe_scan(&mut self) {
        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        if reader.scans.sequence() == reader.last_sequence {
            return;
        }
        let sequence = reader.scans.read_into(&mut reader.scratch);
        if sequence == reader.last_sequence {
            return;
        }
        reader.last_sequence = sequence;
        let extent = range_extent(reader.scratch.as_slice());
        debug!(
            module = %self.id,
            sequence,
            min_m = extent.map(|(lo, _)| lo),
            max_m = extent.map(|(_, hi)| hi),
            "new scan"
        );
    }
}

impl Module for WorkerModule {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn shutdown_observed(&self) -> bool {
        self.supervisor.shutdown_requested()
    }

    fn run_cycle(&mut self) -> CycleOutcome {
        self.supervisor.beat(self.id);
        self.observe_scan();
        self.cycles += 1;
        thread::sleep(self.interval);
        CycleOutcome::Continue
    }
}
