//! Range-sensor acquisition client.
//!
//! Drives one session through
//! `Disconnected → Connecting → Authenticating → Streaming → Terminated`
//! and publishes every successfully parsed scan into the [`SharedScanBuffer`].
//!
//! Transport failures end the session for good: there is no reconnect, and
//! the failure is reported through the log and the returned error. A frame
//! that cannot be parsed is logged and skipped. In simulate mode the network
//! states are skipped and scans are synthesized by [`ScanSimulator`].
//!
//! Neither shared lock is held across socket I/O: samples are converted into
//! a private scratch scan first and only the final copy happens under the
//! scan-buffer lock.

use super::framing::FrameAssembler;
use super::geometry::PolarGeometry;
use super::parser::ScanFrameParser;
use super::protocol::{auth_accepted, auth_line, preview, request_frame};
use super::simulator::ScanSimulator;
use crate::config::{AcquisitionMode, AuthPolicy, LidarConfig};
use crate::error::{AcquisitionError, FrameError};
use crate::modules::{CycleOutcome, Module};
use crate::shared::{
    scan_buffer::range_extent, ModuleId, Scan, ScanSample, SharedScanBuffer, SupervisorState,
    SCAN_SAMPLES,
};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use tracing::{debug, error, info, warn};

/// Characters of a rejected frame shown in the skip warning.
const SKIP_PREVIEW: usize = 120;

/// Cartesian points logged at debug level after each publish.
const DEBUG_POINTS: usize = 10;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not started
    Disconnected,
    /// Opening the TCP connection
    Connecting,
    /// Exchanging the identifier line
    Authenticating,
    /// Request/response loop
    Streaming,
    /// Session over; the client is never reused
    Terminated,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Scans written to the shared buffer
    pub published: u64,
    /// Frames skipped because they could not be parsed
    pub skipped: u64,
    /// Sample tokens decoded as zero across all published scans
    pub defaulted: u64,
}

/// Open connection: one handle for requests, a clone feeding the assembler.
#[derive(Debug)]
struct Session {
    stream: TcpStream,
    frames: FrameAssembler<TcpStream>,
}

#[derive(Debug)]
enum Source {
    Idle,
    Network(Session),
    Simulated(ScanSimulator),
}

/// Acquisition module body.
#[derive(Debug)]
pub struct AcquisitionClient {
    config: LidarConfig,
    scans: SharedScanBuffer,
    supervisor: SupervisorState,
    parser: ScanFrameParser,
    geometry: PolarGeometry,
    request: Vec<u8>,
    state: ClientState,
    source: Source,
    scratch: Box<Scan>,
    stats: ClientStats,
}

impl AcquisitionClient {
    /// Client for `config`, publishing into `scans` and observing `supervisor`.
    pub fn new(config: LidarConfig, scans: SharedScanBuffer, supervisor: SupervisorState) -> Self {
        Self {
            parser: ScanFrameParser::new(config.marker.clone(), SCAN_SAMPLES),
            geometry: PolarGeometry::default(),
            request: request_frame(&config.command),
            state: ClientState::Disconnected,
            source: Source::Idle,
            scratch: Box::new([ScanSample::default(); SCAN_SAMPLES]),
            stats: ClientStats::default(),
            config,
            scans,
            supervisor,
        }
    }

    /// Current session state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Run the whole session on the calling thread.
    ///
    /// Returns `Ok(())` when it ended because shutdown was requested, or the
    /// terminal error that ended it otherwise.
    pub fn run(&mut self) -> Result<(), AcquisitionError> {
        let result = self.drive();
        if let Err(e) = &result {
            self.fail(e);
        }
        self.terminate();
        result
    }

    fn drive(&mut self) -> Result<(), AcquisitionError> {
        self.open()?;
        while !self.supervisor.shutdown_requested() {
            self.stream_cycle()?;
        }
        Ok(())
    }

    /// Move from `Disconnected` to `Streaming`.
    pub fn open(&mut self) -> Result<(), AcquisitionError> {
        match self.config.mode {
            AcquisitionMode::Simulate => {
                info!(
                    module = "lidar",
                    interval_ms = self.config.poll_interval_ms,
                    "simulated acquisition, no sensor connection"
                );
                self.source = Source::Simulated(ScanSimulator::new(SCAN_SAMPLES));
            }
            AcquisitionMode::Network => {
                let mut stream = self.connect()?;
                if let AuthPolicy::Identifier { identifier } = &self.config.auth {
                    self.state = ClientState::Authenticating;
                    authenticate(&mut stream, identifier, self.config.auth_response_limit)?;
                    info!(module = "lidar", "authenticated");
                }
                let reader = stream.try_clone()?;
                let frames =
                    FrameAssembler::new(reader, self.config.carry_limit, self.config.read_chunk);
                self.source = Source::Network(Session { stream, frames });
            }
        }
        self.state = ClientState::Streaming;
        Ok(())
    }

    fn connect(&mut self) -> Result<TcpStream, AcquisitionError> {
        self.state = ClientState::Connecting;
        let endpoint = self.config.endpoint();
        let connect_failed = |source| AcquisitionError::ConnectFailed {
            endpoint: endpoint.clone(),
            source,
        };

        let addrs: Vec<SocketAddr> = endpoint
            .to_socket_addrs()
            .map_err(connect_failed)?
            .collect();

        let mut last_err = std::io::Error::new(ErrorKind::NotFound, "no address resolved");
        for addr in addrs {
            let attempt = if self.config.connect_timeout_ms == 0 {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, self.config.connect_timeout())
            };
            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(connect_failed)?;
                    stream
                        .set_read_timeout(self.config.read_timeout())
                        .map_err(connect_failed)?;
                    info!(module = "lidar", %addr, "connected to range sensor");
                    return Ok(stream);
                }
                Err(e) => last_err = e,
            }
        }
        Err(connect_failed(last_err))
    }

    /// One request/response (or one synthesized scan), then the pacing sleep.
    pub fn stream_cycle(&mut self) -> Result<(), AcquisitionError> {
        let ranges = match &mut self.source {
            Source::Network(session) => {
                session.stream.write_all(&self.request)?;
                let frame = session.frames.next_frame()?;
                match self.parser.parse(&frame) {
                    Ok(parsed) => {
                        self.stats.defaulted += parsed.defaulted as u64;
                        Some(parsed.ranges_mm)
                    }
                    Err(e) => {
                        skip_frame(&e, &frame);
                        self.stats.skipped += 1;
                        None
                    }
                }
            }
            Source::Simulated(simulator) => Some(simulator.next_ranges()),
            Source::Idle => return Err(AcquisitionError::ConnectionClosed),
        };

        if let Some(ranges) = ranges {
            self.publish(&ranges);
        }
        self.supervisor.beat(ModuleId::Lidar);
        thread::sleep(self.config.poll_interval());
        Ok(())
    }

    fn publish(&mut self, ranges_mm: &[u32]) {
        self.geometry.convert_into(ranges_mm, &mut self.scratch);
        let frame = self.scans.publish(&self.scratch);
        self.stats.published += 1;

        let extent = range_extent(self.scratch.as_slice());
        info!(
            module = "lidar",
            frame,
            n = ranges_mm.len(),
            min_m = extent.map(|(lo, _)| lo),
            max_m = extent.map(|(_, hi)| hi),
            "scan published"
        );
        debug!(
            module = "lidar",
            frame,
            points = ?&self.scratch[..DEBUG_POINTS],
            "first points"
        );
    }

    fn fail(&self, e: &AcquisitionError) {
        error!(
            module = "lidar",
            state = ?self.state,
            endpoint = %self.config.endpoint(),
            error = %e,
            "acquisition terminated"
        );
    }

    fn terminate(&mut self) {
        if let Source::Network(session) = &self.source {
            // Peer may already be gone
            let _ = session.stream.shutdown(Shutdown::Both);
        }
        self.source = Source::Idle;
        if self.state != ClientState::Terminated {
            info!(
                module = "lidar",
                published = self.stats.published,
                skipped = self.stats.skipped,
                "acquisition stopped"
            );
        }
        self.state = ClientState::Terminated;
    }
}

fn authenticate(
    stream: &mut TcpStream,
    identifier: &str,
    limit: usize,
) -> Result<(), AcquisitionError> {
    stream.write_all(&auth_line(identifier))?;

    let mut response = vec![0u8; limit];
    let n = loop {
        match stream.read(&mut response) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };
    if n == 0 {
        return Err(AcquisitionError::ConnectionClosed);
    }
    if !auth_accepted(&response[..n]) {
        return Err(AcquisitionError::AuthFailed {
            response: preview(&response[..n], limit),
        });
    }
    Ok(())
}

fn skip_frame(e: &FrameError, frame: &[u8]) {
    warn!(
        module = "lidar",
        error = %e,
        head = %preview(frame, SKIP_PREVIEW),
        "frame skipped"
    );
}

impl Module for AcquisitionClient {
    fn id(&self) -> ModuleId {
        ModuleId::Lidar
    }

    fn shutdown_observed(&self) -> bool {
        self.supervisor.shutdown_requested()
    }

    fn run_cycle(&mut self) -> CycleOutcome {
        let result = match self.state {
            ClientState::Terminated => return CycleOutcome::Stop,
            ClientState::Streaming => self.stream_cycle(),
            _ => self.open(),
        };
        match result {
            Ok(()) => CycleOutcome::Continue,
            Err(e) => {
                self.fail(&e);
                self.terminate();
                CycleOutcome::Stop
            }
        }
    }

    fn finish(&mut self) {
        self.terminate();
    }
}
