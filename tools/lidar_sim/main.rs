/*
 * Range Sensor Simulator
 *
 * Serves the LMDscandata request/response protocol on 127.0.0.1 so the
 * harness can run its network acquisition path without hardware.
 *
 * Fault options mirror the mock used by the integration tests: chunked
 * writes, a corrupted sample, seeded random corruption, and closing the
 * connection after a number of replies.
 *
 * Stop with Ctrl-C.
 */

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::mpsc;
use tracing::info;
use ugv_harness::lidar::mock::{frame_ranges, ramp_ranges, MockSensor};
use ugv_harness::lidar::protocol::DEFAULT_PORT;
use ugv_harness::tracing_setup::{self, TracingConfig};

#[derive(Parser)]
#[command(name = "lidar-sim")]
#[command(about = "Loopback range-sensor simulator", long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Require this identifier line before serving
    #[arg(long)]
    identifier: Option<String>,

    /// Write replies in pieces of this many bytes
    #[arg(long)]
    chunk: Option<usize>,

    /// Replace this sample index with a non-hex token
    #[arg(long)]
    corrupt_sample: Option<usize>,

    /// Corrupt samples at random with this probability
    #[arg(long)]
    corrupt_probability: Option<f64>,

    /// Seed for random corruption
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Close each connection after this many replies
    #[arg(long)]
    close_after: Option<u64>,

    /// Vary the range per frame instead of per angle
    #[arg(long)]
    per_frame: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_setup::init(TracingConfig::default()).map_err(anyhow::Error::msg)?;

    let mut builder = MockSensor::builder()
        .port(args.port)
        .ranges(if args.per_frame { frame_ranges } else { ramp_ranges });
    if let Some(identifier) = args.identifier {
        builder = builder.require_identifier(identifier);
    }
    if let Some(size) = args.chunk {
        builder = builder.chunk_size(size);
    }
    if let Some(index) = args.corrupt_sample {
        builder = builder.corrupt_sample(index);
    }
    if let Some(probability) = args.corrupt_probability {
        builder = builder.random_corruption(args.seed, probability);
    }
    if let Some(replies) = args.close_after {
        builder = builder.close_after(replies);
    }

    let sensor = builder
        .start()
        .with_context(|| format!("Failed to listen on 127.0.0.1:{}", args.port))?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    info!(addr = %sensor.addr(), "serving; Ctrl-C to stop");
    // A closed channel means the handler is gone; stop either way
    let _ = rx.recv();

    let report = sensor.shutdown();
    info!(
        connections = report.connections,
        requests = report.requests,
        replies = report.replies,
        auth_rejected = report.auth_rejected,
        "simulator stopped"
    );
    Ok(())
}
