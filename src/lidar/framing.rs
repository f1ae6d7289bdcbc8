//! Reassembly of `STX … ETX` frames from a byte stream.
//!
//! TCP delivers the sensor's replies in arbitrary pieces: one read may hold
//! half a frame, or the tail of one frame and the whole of the next. Bytes are
//! appended to a carry buffer and frames are cut out of it as soon as a start
//! delimiter followed by an end delimiter is present. Anything after the end
//! delimiter stays in the carry for the next pull.
//!
//! The carry is bounded: if it grows past the configured ceiling without
//! yielding a frame it is discarded and assembly starts over.

use super::protocol::{ETX, STX};
use crate::error::AcquisitionError;
use bytes::{Buf, Bytes, BytesMut};
use std::io::{ErrorKind, Read};
use tracing::warn;

/// Carry buffer and delimiter search, independent of any transport.
#[derive(Debug)]
pub struct FrameBuffer {
    carry: BytesMut,
    limit: usize,
    resets: u64,
}

impl FrameBuffer {
    /// Create an empty buffer that resets once it holds more than `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            carry: BytesMut::with_capacity(limit.min(64 * 1024)),
            limit,
            resets: 0,
        }
    }

    /// Append a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.carry.extend_from_slice(chunk);
    }

    /// Cut the next complete frame out of the carry, delimiters stripped.
    ///
    /// Bytes before the frame's start delimiter are dropped. If a start
    /// delimiter is followed by another one before any end delimiter, the
    /// earlier, unterminated frame is abandoned and the later one is used.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            let etx = self.carry.iter().position(|&b| b == ETX)?;
            match self.carry[..etx].iter().rposition(|&b| b == STX) {
                Some(stx) => {
                    self.carry.advance(stx);
                    let frame = self.carry.split_to(etx - stx + 1).freeze();
                    return Some(frame.slice(1..frame.len() - 1));
                }
                // End delimiter with no start: stale tail of a lost frame
                None => self.carry.advance(etx + 1),
            }
        }
    }

    /// Discard the carry if it exceeds the ceiling. Returns whether it did.
    pub fn enforce_limit(&mut self) -> bool {
        if self.carry.len() <= self.limit {
            return false;
        }
        warn!(
            carry = self.carry.len(),
            limit = self.limit,
            "carry too long without a complete frame, reset"
        );
        self.carry.clear();
        self.resets += 1;
        true
    }

    /// Bytes currently held.
    pub fn len(&self) -> usize {
        self.carry.len()
    }

    /// Whether the carry is empty.
    pub fn is_empty(&self) -> bool {
        self.carry.is_empty()
    }

    /// How many times the ceiling forced a reset.
    pub fn resets(&self) -> u64 {
        self.resets
    }
}

/// Pulls complete frames from a blocking reader.
///
/// Dropping the assembler drops its carry; a new connection gets a new one.
#[derive(Debug)]
pub struct FrameAssembler<R> {
    reader: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
    failed: bool,
}

impl<R: Read> FrameAssembler<R> {
    /// Wrap `reader`, reading at most `chunk_size` bytes per call.
    pub fn new(reader: R, carry_limit: usize, chunk_size: usize) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::with_limit(carry_limit),
            chunk: vec![0u8; chunk_size.max(1)],
            failed: false,
        }
    }

    /// Block until the next complete frame is available.
    ///
    /// Frames already sitting in the carry are returned without reading.
    /// A zero-length read yields `ConnectionClosed`; any other read failure
    /// yields `ConnectionError`. Both end the session.
    pub fn next_frame(&mut self) -> Result<Bytes, AcquisitionError> {
        loop {
            if let Some(frame) = self.buffer.next_frame() {
                return Ok(frame);
            }
            self.buffer.enforce_limit();

            let n = match self.reader.read(&mut self.chunk) {
                Ok(0) => return Err(AcquisitionError::ConnectionClosed),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(AcquisitionError::ConnectionError(e)),
            };
            self.buffer.push(&self.chunk[..n]);
        }
    }

    /// The carry buffer.
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }
}

impl<R: Read> Iterator for FrameAssembler<R> {
    type Item = Result<Bytes, AcquisitionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_frame();
        self.failed = item.is_err();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use tracing_test::traced_test;

    /// Reader that hands out pre-cut chunks, then reports end of stream.
    struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
        fail_at_end: Option<ErrorKind>,
    }

    impl ChunkedReader {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into(),
                fail_at_end: None,
            }
        }

        fn failing(chunks: Vec<Vec<u8>>, kind: ErrorKind) -> Self {
            Self {
                chunks: chunks.into(),
                fail_at_end: Some(kind),
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    assert!(chunk.len() <= buf.len(), "test chunk larger than read size");
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => match self.fail_at_end {
                    Some(kind) => Err(io::Error::from(kind)),
                    None => Ok(0),
                },
            }
        }
    }

    fn framed(payload: &str) -> Vec<u8> {
        let mut out = vec![STX];
        out.extend_from_slice(payload.as_bytes());
        out.push(ETX);
        out
    }

    fn stream_of(payloads: &[&str]) -> Vec<u8> {
        payloads.iter().flat_map(|p| framed(p)).collect()
    }

    fn drain(assembler: &mut FrameAssembler<ChunkedReader>) -> Vec<String> {
        let mut frames = Vec::new();
        for item in assembler.by_ref() {
            match item {
                Ok(frame) => frames.push(String::from_utf8(frame.to_vec()).unwrap()),
                Err(AcquisitionError::ConnectionClosed) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        frames
    }

    #[test]
    fn test_frames_split_across_every_chunk_size() {
        let payloads = ["sRA LMDscandata 1 DIST1 A 1 2", "second", "x"];
        let stream = stream_of(&payloads);

        for size in 1..=stream.len() {
            let chunks = stream.chunks(size).map(<[u8]>::to_vec).collect();
            let mut assembler = FrameAssembler::new(ChunkedReader::new(chunks), 60_000, 64);
            assert_eq!(drain(&mut assembler), payloads, "chunk size {size}");
        }
    }

    #[test]
    fn test_concatenated_frames_are_all_delivered() {
        let stream = stream_of(&["one", "two", "three"]);
        let mut assembler = FrameAssembler::new(ChunkedReader::new(vec![stream]), 60_000, 1024);

        assert_eq!(&assembler.next_frame().unwrap()[..], b"one");
        // Remaining frames come from the carry without another read
        assert_eq!(&assembler.next_frame().unwrap()[..], b"two");
        assert_eq!(&assembler.next_frame().unwrap()[..], b"three");
        assert!(matches!(
            assembler.next_frame(),
            Err(AcquisitionError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_leading_garbage_and_stale_etx_are_dropped() {
        let mut buffer = FrameBuffer::with_limit(1024);
        buffer.push(b"noise\x03more\x02payload\x03tail");
        assert_eq!(&buffer.next_frame().unwrap()[..], b"payload");
        assert_eq!(buffer.len(), 4);
        assert!(buffer.next_frame().is_none());
    }

    #[test]
    fn test_unterminated_frame_is_abandoned_for_next_start() {
        let mut buffer = FrameBuffer::with_limit(1024);
        buffer.push(b"\x02partial\x02complete\x03");
        assert_eq!(&buffer.next_frame().unwrap()[..], b"complete");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_stale_etx_flood_is_discarded() {
        let mut buffer = FrameBuffer::with_limit(60_000);
        buffer.push(&vec![ETX; 200_000]);
        assert!(buffer.next_frame().is_none());
        assert!(buffer.is_empty());

        buffer.push(&framed("after-flood"));
        assert_eq!(&buffer.next_frame().unwrap()[..], b"after-flood");
    }

    #[test]
    fn test_etx_only_reads_on_module_thread() {
        let mut chunks: Vec<Vec<u8>> = (0..8).map(|_| vec![ETX; 16_384]).collect();
        chunks.push(framed("ok"));
        let reader = ChunkedReader::new(chunks);

        let handle = std::thread::spawn(move || {
            let mut assembler = FrameAssembler::new(reader, 60_000, 16_384);
            let frame = assembler.next_frame().map(|f| f.to_vec());
            (frame, assembler.buffer().resets())
        });
        let (frame, resets) = handle.join().unwrap();
        assert_eq!(frame.unwrap(), b"ok");
        assert_eq!(resets, 0);
    }

    #[test]
    fn test_empty_frame() {
        let mut buffer = FrameBuffer::with_limit(1024);
        buffer.push(b"\x02\x03");
        assert_eq!(buffer.next_frame().unwrap().len(), 0);
    }

    #[traced_test]
    #[test]
    fn test_carry_resets_above_limit() {
        let limit = 100;
        let mut chunks: Vec<Vec<u8>> = vec![vec![STX]];
        chunks.extend((0..10).map(|_| vec![b'A'; 40]));
        let mut assembler = FrameAssembler::new(ChunkedReader::new(chunks), limit, 64);

        assert!(matches!(
            assembler.next_frame(),
            Err(AcquisitionError::ConnectionClosed)
        ));
        assert!(assembler.buffer().resets() >= 3);
        assert!(assembler.buffer().len() <= limit + 40);
        assert!(logs_contain("carry too long"));
    }

    #[test]
    fn test_assembly_continues_after_reset() {
        let mut chunks: Vec<Vec<u8>> = (0..4).map(|_| vec![b'Z'; 50]).collect();
        chunks.push(framed("after-reset"));
        let mut assembler = FrameAssembler::new(ChunkedReader::new(chunks), 120, 64);

        assert_eq!(&assembler.next_frame().unwrap()[..], b"after-reset");
        assert_eq!(assembler.buffer().resets(), 1);
    }

    #[test]
    fn test_read_error_is_connection_error_and_fuses() {
        let reader = ChunkedReader::failing(vec![b"\x02half".to_vec()], ErrorKind::ConnectionReset);
        let mut assembler = FrameAssembler::new(reader, 60_000, 64);

        match assembler.next() {
            Some(Err(AcquisitionError::ConnectionError(e))) => {
                assert_eq!(e.kind(), ErrorKind::ConnectionReset)
            }
            other => panic!("expected connection error, got {other:?}"),
        }
        assert!(assembler.next().is_none());
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        struct Flaky(bool);
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if !self.0 {
                    self.0 = true;
                    return Err(io::Error::from(ErrorKind::Interrupted));
                }
                let frame = b"\x02ok\x03";
                buf[..frame.len()].copy_from_slice(frame);
                Ok(frame.len())
            }
        }

        let mut assembler = FrameAssembler::new(Flaky(false), 1024, 16);
        assert_eq!(&assembler.next_frame().unwrap()[..], b"ok");
    }
}
