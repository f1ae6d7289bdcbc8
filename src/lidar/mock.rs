//! Loopback mock range sensor.
//!
//! Serves the request/response protocol on `127.0.0.1` from a background
//! thread, answering every request frame with one LMS-style `LMDscandata`
//! telegram. Used by the integration tests and the `lidar-sim` binary.
//!
//! Faults are opt-in through [`MockSensorBuilder`]: identifier checking,
//! chunked writes, two replies in one write, corrupted sample tokens, a
//! missing marker, and closing the connection after a number of replies.
//! Random corruption is driven by a seeded `ChaCha8Rng` so a failing run can
//! be replayed.
//!
//! # Example
//!
//! ```no_run
//! use ugv_harness::lidar::mock::MockSensor;
//!
//! # fn main() -> std::io::Result<()> {
//! let sensor = MockSensor::builder().chunk_size(7).close_after(3).start()?;
//! let config = sensor.lidar_config();
//! println!("mock sensor on {}", config.endpoint());
//! let report = sensor.shutdown();
//! println!("served {} replies", report.replies);
//! # Ok(())
//! # }
//! ```

use super::framing::FrameBuffer;
use super::protocol::{AUTH_OK, DEFAULT_MARKER, ETX, STX};
use crate::config::{AuthPolicy, LidarConfig};
use crate::shared::SCAN_SAMPLES;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Range profile: `(frame number, sample index) -> millimeters`.
pub type RangeFn = fn(u64, usize) -> u32;

/// 1 m at 0° rising by 1 cm per sample.
pub fn ramp_ranges(_frame: u64, index: usize) -> u32 {
    1000 + 10 * index as u32
}

/// Same range at every angle, different for each frame.
pub fn frame_ranges(frame: u64, _index: usize) -> u32 {
    1000 + (frame % 4000) as u32
}

const ACCEPT_POLL: Duration = Duration::from_millis(5);
const READ_POLL: Duration = Duration::from_millis(20);
const CHUNK_GAP: Duration = Duration::from_micros(300);
const REJECTED_MARKER: &str = "DIST0";
const CORRUPT_TOKEN: &str = "ZZ";

/// Counters returned when the mock sensor stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockReport {
    /// Connections accepted
    pub connections: u64,
    /// Identifier lines that did not match
    pub auth_rejected: u64,
    /// Request frames received
    pub requests: u64,
    /// Telegrams sent
    pub replies: u64,
}

#[derive(Debug, Clone)]
struct MockOptions {
    port: u16,
    identifier: Option<String>,
    chunk_size: Option<usize>,
    coalesce_first: bool,
    corrupt_sample: Option<usize>,
    omit_marker_on: Vec<u64>,
    close_after: Option<u64>,
    random_corruption: Option<(u64, f64)>,
    samples: usize,
    ranges: RangeFn,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            port: 0,
            identifier: None,
            chunk_size: None,
            coalesce_first: false,
            corrupt_sample: None,
            omit_marker_on: Vec::new(),
            close_after: None,
            random_corruption: None,
            samples: SCAN_SAMPLES,
            ranges: ramp_ranges,
        }
    }
}

/// Builder for [`MockSensor`].
#[derive(Debug, Clone, Default)]
pub struct MockSensorBuilder {
    options: MockOptions,
}

impl MockSensorBuilder {
    /// Listen on a fixed port instead of an ephemeral one.
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Require `identifier\n` before serving; anything else is rejected.
    pub fn require_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.options.identifier = Some(identifier.into());
        self
    }

    /// Write each reply in pieces of `size` bytes.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.options.chunk_size = Some(size.max(1));
        self
    }

    /// Answer the first request with two telegrams in a single write.
    pub fn coalesce_first_reply(mut self) -> Self {
        self.options.coalesce_first = true;
        self
    }

    /// Replace sample `index` with a non-hex token in every telegram.
    pub fn corrupt_sample(mut self, index: usize) -> Self {
        self.options.corrupt_sample = Some(index);
        self
    }

    /// Send telegram number `frame` (1-based) without the marker.
    pub fn omit_marker_on(mut self, frame: u64) -> Self {
        self.options.omit_marker_on.push(frame);
        self
    }

    /// Close the connection once `replies` telegrams have been sent.
    pub fn close_after(mut self, replies: u64) -> Self {
        self.options.close_after = Some(replies);
        self
    }

    /// Corrupt each sample token with `probability`, seeded for replay.
    pub fn random_corruption(mut self, seed: u64, probability: f64) -> Self {
        self.options.random_corruption = Some((seed, probability.clamp(0.0, 1.0)));
        self
    }

    /// Number of samples per telegram.
    pub fn samples(mut self, samples: usize) -> Self {
        self.options.samples = samples;
        self
    }

    /// Range profile of the telegrams.
    pub fn ranges(mut self, ranges: RangeFn) -> Self {
        self.options.ranges = ranges;
        self
    }

    /// Bind the listener and start serving.
    pub fn start(self) -> io::Result<MockSensor> {
        let listener = TcpListener::bind(("127.0.0.1", self.options.port))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let identifier = self.options.identifier.clone();
        let stop = Arc::new(AtomicBool::new(false));

        let server = Server {
            options: self.options,
            stop: stop.clone(),
            rng: None,
            report: MockReport::default(),
        };
        let handle = thread::Builder::new()
            .name("mock-sensor".to_string())
            .spawn(move || server.serve(listener))?;

        info!(%addr, "mock range sensor listening");
        Ok(MockSensor {
            addr,
            identifier,
            stop,
            handle: Some(handle),
        })
    }
}

/// Running mock sensor. Stops when dropped.
#[derive(Debug)]
pub struct MockSensor {
    addr: SocketAddr,
    identifier: Option<String>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<MockReport>>,
}

impl MockSensor {
    /// Start configuring a mock sensor.
    pub fn builder() -> MockSensorBuilder {
        MockSensorBuilder::default()
    }

    /// Start a fault-free mock sensor on an ephemeral port.
    pub fn start() -> io::Result<Self> {
        Self::builder().start()
    }

    /// Listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Listening port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client configuration pointing at this sensor, with a short poll interval.
    pub fn lidar_config(&self) -> LidarConfig {
        LidarConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            auth: match &self.identifier {
                Some(identifier) => AuthPolicy::Identifier {
                    identifier: identifier.clone(),
                },
                None => AuthPolicy::None,
            },
            poll_interval_ms: 5,
            connect_timeout_ms: 1000,
            read_timeout_ms: 2000,
            ..LidarConfig::default()
        }
    }

    /// Stop serving and return the counters.
    pub fn shutdown(mut self) -> MockReport {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> MockReport {
        self.stop.store(true, Ordering::SeqCst);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(report)) => report,
            Some(Err(_)) => {
                warn!("mock sensor thread panicked");
                MockReport::default()
            }
            None => MockReport::default(),
        }
    }
}

impl Drop for MockSensor {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop_and_join();
        }
    }
}

struct Server {
    options: MockOptions,
    stop: Arc<AtomicBool>,
    rng: Option<(ChaCha8Rng, f64)>,
    report: MockReport,
}

impl Server {
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn serve(mut self, listener: TcpListener) -> MockReport {
        self.rng = self
            .options
            .random_corruption
            .map(|(seed, p)| (ChaCha8Rng::seed_from_u64(seed), p));

        while !self.stopping() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    self.report.connections += 1;
                    debug!(%peer, "mock sensor accepted connection");
                    if let Err(e) = self.serve_connection(stream) {
                        debug!(%peer, error = %e, "mock sensor connection ended");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!(error = %e, "mock sensor accept failed");
                    break;
                }
            }
        }
        self.report
    }

    fn serve_connection(&mut self, mut stream: TcpStream) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_POLL))?;

        let mut incoming = FrameBuffer::with_limit(64 * 1024);
        let mut buf = [0u8; 1024];

        if let Some(identifier) = self.options.identifier.clone() {
            let Some(line) = self.read_line(&mut stream, &mut buf)? else {
                return Ok(());
            };
            let accepted = line.trim_end_matches(['\r', '\n']) == identifier;
            if !accepted {
                self.report.auth_rejected += 1;
                stream.write_all(b"DENIED\n")?;
                return Ok(());
            }
            stream.write_all(format!("{AUTH_OK}\n").as_bytes())?;
        }

        let mut sent = 0u64;
        loop {
            while incoming.next_frame().is_some() {
                self.report.requests += 1;

                let first = sent + 1;
                let mut reply = self.telegram(first);
                sent = first;
                if first == 1 && self.options.coalesce_first {
                    sent += 1;
                    reply.extend(self.telegram(sent));
                }
                self.write_reply(&mut stream, &reply)?;
                self.report.replies += sent - first + 1;

                if self.options.close_after.is_some_and(|n| sent >= n) {
                    debug!(sent, "mock sensor closing connection");
                    return Ok(());
                }
            }

            if self.stopping() {
                return Ok(());
            }
            match stream.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => incoming.push(&buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Read up to and including the first newline. `None` if the peer left
    /// or the server is stopping.
    fn read_line(&self, stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<Option<String>> {
        let mut line = Vec::new();
        loop {
            if self.stopping() {
                return Ok(None);
            }
            match stream.read(buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    line.extend_from_slice(&buf[..n]);
                    if line.contains(&b'\n') {
                        return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn write_reply(&self, stream: &mut TcpStream, reply: &[u8]) -> io::Result<()> {
        match self.options.chunk_size {
            Some(size) => {
                for piece in reply.chunks(size) {
                    stream.write_all(piece)?;
                    stream.flush()?;
                    thread::sleep(CHUNK_GAP);
                }
            }
            None => stream.write_all(reply)?,
        }
        Ok(())
    }

    /// One framed telegram for reply number `frame`.
    fn telegram(&mut self, frame: u64) -> Vec<u8> {
        let options = &self.options;
        let marker = if options.omit_marker_on.contains(&frame) {
            REJECTED_MARKER
        } else {
            DEFAULT_MARKER
        };

        let mut payload = format!(
            "sRA LMDscandata 1 1 89A27F 0 0 {frame:X} {frame:X} 0 0 7 0 0 1388 168 0 1 \
             {marker} 3F800000 00000000 0 1388 {:X}",
            options.samples
        );
        for i in 0..options.samples {
            let corrupt = options.corrupt_sample == Some(i)
                || self
                    .rng
                    .as_mut()
                    .is_some_and(|(rng, p)| rng.gen_bool(*p));
            payload.push(' ');
            if corrupt {
                payload.push_str(CORRUPT_TOKEN);
            } else {
                payload.push_str(&format!("{:X}", (options.ranges)(frame, i)));
            }
        }
        payload.push_str(" 0 0 0 0 0");

        let mut telegram = Vec::with_capacity(payload.len() + 2);
        telegram.push(STX);
        telegram.extend_from_slice(payload.as_bytes());
        telegram.push(ETX);
        telegram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lidar::framing::FrameAssembler;
    use crate::lidar::parser::ScanFrameParser;
    use crate::lidar::protocol::request_frame;

    fn request(stream: &mut TcpStream) {
        stream.write_all(&request_frame("sRN LMDscandata")).unwrap();
    }

    #[test]
    fn test_serves_parseable_telegrams() {
        let sensor = MockSensor::start().unwrap();
        let mut stream = TcpStream::connect(sensor.addr()).unwrap();
        let mut frames = FrameAssembler::new(stream.try_clone().unwrap(), 60_000, 4096);
        let parser = ScanFrameParser::new("DIST1", SCAN_SAMPLES);

        for _ in 0..3 {
            request(&mut stream);
            let parsed = parser.parse(&frames.next_frame().unwrap()).unwrap();
            assert_eq!(parsed.ranges_mm[0], 1000);
            assert_eq!(parsed.ranges_mm[360], 4600);
        }
        drop(stream);
        drop(frames);

        let report = sensor.shutdown();
        assert_eq!(report.connections, 1);
        assert_eq!(report.requests, 3);
        assert_eq!(report.replies, 3);
    }

    #[test]
    fn test_seeded_corruption_is_reproducible() {
        let corrupted = |seed| {
            let mut server = Server {
                options: MockOptions {
                    random_corruption: Some((seed, 0.1)),
                    ..MockOptions::default()
                },
                stop: Arc::new(AtomicBool::new(false)),
                rng: Some((ChaCha8Rng::seed_from_u64(seed), 0.1)),
                report: MockReport::default(),
            };
            server.telegram(1)
        };
        assert_eq!(corrupted(7), corrupted(7));
        assert_ne!(corrupted(7), corrupted(8));
    }

    #[test]
    fn test_marker_omitted_on_selected_frame() {
        let mut server = Server {
            options: MockOptions {
                omit_marker_on: vec![2],
                ..MockOptions::default()
            },
            stop: Arc::new(AtomicBool::new(false)),
            rng: None,
            report: MockReport::default(),
        };
        let first = String::from_utf8(server.telegram(1)).unwrap();
        let second = String::from_utf8(server.telegram(2)).unwrap();
        assert!(first.contains(" DIST1 "));
        assert!(!second.contains("DIST1"));
    }
}
