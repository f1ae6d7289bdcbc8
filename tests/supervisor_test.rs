//! Integration tests for the supervisor lifecycle.

use std::net::TcpListener;
use std::time::{Duration, Instant};
use ugv_harness::config::{AcquisitionExitPolicy, AcquisitionMode, HarnessConfig};
use ugv_harness::input::{LineQuit, QuitSource};
use ugv_harness::lidar::mock::MockSensor;
use ugv_harness::modules::ModuleExit;
use ugv_harness::shared::{HeartbeatMask, ModuleId};
use ugv_harness::supervisor::{ModuleStatus, StopReason, Supervisor};
use ugv_harness::AppResult;

/// Quits after a fixed wall-clock delay.
struct QuitAt {
    at: Instant,
    quit_requested: Option<Instant>,
}

impl QuitAt {
    fn after(delay: Duration) -> Self {
        Self {
            at: Instant::now() + delay,
            quit_requested: None,
        }
    }
}

impl QuitSource for QuitAt {
    fn poll_quit(&mut self, timeout: Duration) -> AppResult<bool> {
        std::thread::sleep(timeout);
        if Instant::now() >= self.at {
            self.quit_requested = Some(Instant::now());
            return Ok(true);
        }
        Ok(false)
    }
}

fn fast_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.lidar.mode = AcquisitionMode::Simulate;
    config.lidar.poll_interval_ms = 10;
    config.modules.display_ms = 20;
    config.modules.gnss_ms = 15;
    config.modules.controller_ms = 8;
    config.modules.vehicle_control_ms = 10;
    config.modules.crash_avoidance_ms = 9;
    config.supervisor.poll_interval_ms = 20;
    config
}

fn unused_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn test_operator_quit_stops_every_module() {
    let supervisor = Supervisor::new(fast_config());
    let scans = supervisor.scans();
    let mut quit = QuitAt::after(Duration::from_millis(300));

    let report = supervisor.run(&mut quit).unwrap();
    let returned = Instant::now();

    assert_eq!(report.reason, StopReason::Operator);
    assert!(report.cycles > 0);
    assert_eq!(report.heartbeats_seen, HeartbeatMask::all());
    assert!(!report.acquisition_exited_early);
    for id in ModuleId::ALL {
        assert_eq!(
            report.status(id),
            Some(ModuleStatus::Exited(ModuleExit::Shutdown)),
            "{id}"
        );
    }
    assert!(supervisor.state().shutdown_requested());
    assert!(scans.sequence() > 0);

    // Every thread is joined within one of the longest module intervals plus slack
    let quit_at = quit.quit_requested.unwrap();
    assert!(returned.duration_since(quit_at) < Duration::from_millis(500));
}

#[test]
fn test_external_shutdown_request_is_honored() {
    let supervisor = Supervisor::new(fast_config());
    let state = supervisor.state();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        state.request_shutdown();
    });

    let report = supervisor.run(&mut QuitAt::after(Duration::from_secs(60))).unwrap();
    trigger.join().unwrap();
    assert_eq!(report.reason, StopReason::External);
}

#[test]
fn test_line_input_quits() {
    let supervisor = Supervisor::new(fast_config());
    let mut quit = LineQuit::spawn(std::io::Cursor::new("status\nq\n")).unwrap();
    let report = supervisor.run(&mut quit).unwrap();
    assert_eq!(report.reason, StopReason::Operator);
}

#[test]
fn test_dead_acquisition_is_logged_and_others_continue() {
    let mut config = fast_config();
    config.lidar.mode = AcquisitionMode::Network;
    config.lidar.port = unused_port();
    config.supervisor.on_acquisition_exit = AcquisitionExitPolicy::Log;

    let supervisor = Supervisor::new(config);
    let report = supervisor
        .run(&mut QuitAt::after(Duration::from_millis(300)))
        .unwrap();

    assert_eq!(report.reason, StopReason::Operator);
    assert!(report.acquisition_exited_early);
    assert_eq!(
        report.status(ModuleId::Lidar),
        Some(ModuleStatus::Exited(ModuleExit::Stopped))
    );
    assert_eq!(
        report.status(ModuleId::Display),
        Some(ModuleStatus::Exited(ModuleExit::Shutdown))
    );
    assert_eq!(supervisor.scans().sequence(), 0);
}

#[test]
fn test_dead_acquisition_can_stop_the_harness() {
    let mut config = fast_config();
    config.lidar.mode = AcquisitionMode::Network;
    config.lidar.port = unused_port();
    config.supervisor.on_acquisition_exit = AcquisitionExitPolicy::Shutdown;

    let supervisor = Supervisor::new(config);
    let report = supervisor
        .run(&mut QuitAt::after(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(report.reason, StopReason::AcquisitionExit);
    assert!(report.acquisition_exited_early);
    assert_eq!(
        report.status(ModuleId::Gnss),
        Some(ModuleStatus::Exited(ModuleExit::Shutdown))
    );
}

#[test]
fn test_network_acquisition_under_supervision() {
    let sensor = MockSensor::start().unwrap();
    let mut config = fast_config();
    config.lidar = sensor.lidar_config();

    let supervisor = Supervisor::new(config);
    let report = supervisor
        .run(&mut QuitAt::after(Duration::from_millis(300)))
        .unwrap();

    assert_eq!(
        report.status(ModuleId::Lidar),
        Some(ModuleStatus::Exited(ModuleExit::Shutdown))
    );
    assert!(supervisor.scans().sequence() > 0);
    assert!(report.heartbeats_seen.contains(HeartbeatMask::LIDAR));
}
