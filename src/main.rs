//! CLI Entry Point for ugv-harness
//!
//! Loads the layered configuration, applies command-line overrides, starts
//! every module thread and supervises until the operator quits.
//!
//! # Usage
//!
//! Against the range-sensor simulator on the default endpoint:
//! ```bash
//! ugv-harness
//! ```
//!
//! Without a sensor, synthesizing scans:
//! ```bash
//! ugv-harness --simulate --log-level debug
//! ```
//!
//! Print the effective configuration:
//! ```bash
//! ugv-harness --config config/harness.toml --dump-config
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;
use ugv_harness::config::{AcquisitionMode, HarnessConfig};
use ugv_harness::input::{LineQuit, QuitSource, TerminalQuit};
use ugv_harness::supervisor::Supervisor;
use ugv_harness::tracing_setup::{self, OutputFormat};

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Scan cycle used when `--simulate` is given on the command line.
const SIMULATE_POLL_MS: u64 = 50;

#[derive(Parser)]
#[command(name = "ugv-harness")]
#[command(about = "UGV simulation harness with range-sensor acquisition", long_about = None)]
struct Cli {
    /// Configuration file (default: config/harness.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Synthesize scans instead of connecting to a sensor
    #[arg(long)]
    simulate: bool,

    /// Range-sensor host
    #[arg(long)]
    host: Option<String>,

    /// Range-sensor TCP port
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for OutputFormat {
    fn from(value: LogFormat) -> Self {
        match value {
            LogFormat::Pretty => OutputFormat::Pretty,
            LogFormat::Compact => OutputFormat::Compact,
            LogFormat::Json => OutputFormat::Json,
        }
    }
}

impl Cli {
    fn apply(&self, config: &mut HarnessConfig) {
        if self.simulate {
            config.lidar.mode = AcquisitionMode::Simulate;
            config.lidar.poll_interval_ms = SIMULATE_POLL_MS;
        }
        if let Some(host) = &self.host {
            config.lidar.host = host.clone();
        }
        if let Some(port) = self.port {
            config.lidar.port = port;
        }
        if let Some(level) = &self.log_level {
            config.application.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.application.log_format = format.into();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => HarnessConfig::load().context("Failed to load configuration")?,
    };
    cli.apply(&mut config);
    config.validate().context("Invalid command-line override")?;

    if cli.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;
    info!(
        name = %config.application.name,
        mode = ?config.lidar.mode,
        endpoint = %config.lidar.endpoint(),
        "starting harness"
    );

    let supervisor = Supervisor::new(config);
    let state = supervisor.state();
    ctrlc::set_handler(move || {
        info!("interrupt received");
        state.request_shutdown();
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut quit: Box<dyn QuitSource> = if std::io::stdin().is_terminal() {
        println!("Press 'q' to quit.");
        Box::new(TerminalQuit::new())
    } else {
        Box::new(LineQuit::stdin()?)
    };

    let report = supervisor.run(quit.as_mut())?;
    info!(
        reason = ?report.reason,
        cycles = report.cycles,
        heartbeats = report.heartbeats_seen.bits(),
        acquisition_exited_early = report.acquisition_exited_early,
        "harness stopped"
    );
    Ok(())
}
