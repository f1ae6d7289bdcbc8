//! Fixed-size scan buffer shared between the acquisition client and readers.
//!
//! The whole scan sits behind a single lock. The writer holds it for the full
//! copy, so a reader always sees either the complete previous scan or the
//! complete new one.

use parking_lot::Mutex;
use std::sync::Arc;

/// Number of samples in one scan (0°..180° at 0.5°).
pub const SCAN_SAMPLES: usize = 361;

/// One range sample in vehicle-frame Cartesian coordinates, meters.
///
/// Index order encodes angle: sample `i` lies at `i * 0.5°`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScanSample {
    /// Forward component
    pub x: f64,
    /// Lateral component
    pub y: f64,
}

impl ScanSample {
    /// Create a sample from its coordinates.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Distance from the sensor origin.
    pub fn range(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// A complete scan as stored in the shared buffer.
pub type Scan = [ScanSample; SCAN_SAMPLES];

#[derive(Debug)]
struct ScanBuffer {
    samples: Box<Scan>,
    /// Number of scans published so far; 0 until the first publish.
    sequence: u64,
}

impl Default for ScanBuffer {
    fn default() -> Self {
        Self {
            samples: Box::new([ScanSample::default(); SCAN_SAMPLES]),
            sequence: 0,
        }
    }
}

/// Consistent copy of the most recent scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSnapshot {
    /// Sequence number of the copied scan (0 = nothing published yet)
    pub sequence: u64,
    /// The samples, in angular order
    pub samples: Box<Scan>,
}

impl ScanSnapshot {
    /// Smallest and largest non-zero range in meters, if any sample is non-zero.
    pub fn range_extent(&self) -> Option<(f64, f64)> {
        range_extent(self.samples.as_slice())
    }
}

/// Smallest and largest non-zero range over `samples`.
pub fn range_extent(samples: &[ScanSample]) -> Option<(f64, f64)> {
    samples
        .iter()
        .map(ScanSample::range)
        .filter(|r| *r > 0.0)
        .fold(None, |acc, r| match acc {
            None => Some((r, r)),
            Some((lo, hi)) => Some((lo.min(r), hi.max(r))),
        })
}

/// Shared handle to the scan buffer.
///
/// Only the acquisition client publishes; every other holder is a reader.
#[derive(Debug, Clone, Default)]
pub struct SharedScanBuffer {
    inner: Arc<Mutex<ScanBuffer>>,
}

impl SharedScanBuffer {
    /// Create an empty buffer (all samples at the origin, sequence 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the whole scan and return its new sequence number.
    pub fn publish(&self, scan: &Scan) -> u64 {
        let mut buffer = self.inner.lock();
        buffer.samples.copy_from_slice(scan);
        buffer.sequence += 1;
        buffer.sequence
    }

    /// Copy the current scan into `out` and return its sequence number.
    pub fn read_into(&self, out: &mut Scan) -> u64 {
        let buffer = self.inner.lock();
        out.copy_from_slice(buffer.samples.as_slice());
        buffer.sequence
    }

    /// Copy the current scan into a new snapshot.
    pub fn snapshot(&self) -> ScanSnapshot {
        let mut samples = Box::new([ScanSample::default(); SCAN_SAMPLES]);
        let sequence = self.read_into(&mut samples);
        ScanSnapshot { sequence, samples }
    }

    /// Sequence number of the latest scan without copying it.
    pub fn sequence(&self) -> u64 {
        self.inner.lock().sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_scan(value: f64) -> Box<Scan> {
        Box::new([ScanSample::new(value, -value); SCAN_SAMPLES])
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = SharedScanBuffer::new();
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.sequence, 0);
        assert!(snapshot.samples.iter().all(|s| *s == ScanSample::default()));
        assert_eq!(snapshot.range_extent(), None);
    }

    #[test]
    fn test_publish_overwrites_and_counts() {
        let buffer = SharedScanBuffer::new();
        assert_eq!(buffer.publish(&uniform_scan(1.0)), 1);
        assert_eq!(buffer.publish(&uniform_scan(2.0)), 2);

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.sequence, 2);
        assert!(snapshot.samples.iter().all(|s| s.x == 2.0 && s.y == -2.0));
        assert_eq!(buffer.sequence(), 2);
    }

    #[test]
    fn test_readers_share_the_writer_buffer() {
        let writer = SharedScanBuffer::new();
        let reader = writer.clone();
        writer.publish(&uniform_scan(3.0));

        let mut out = [ScanSample::default(); SCAN_SAMPLES];
        assert_eq!(reader.read_into(&mut out), 1);
        assert_eq!(out[180], ScanSample::new(3.0, -3.0));
    }

    #[test]
    fn test_range_extent_ignores_zero_samples() {
        let samples = [
            ScanSample::new(0.0, 0.0),
            ScanSample::new(3.0, 4.0),
            ScanSample::new(0.0, 1.5),
        ];
        let (lo, hi) = range_extent(&samples).unwrap();
        assert!((lo - 1.5).abs() < 1e-12);
        assert!((hi - 5.0).abs() < 1e-12);
    }
}
