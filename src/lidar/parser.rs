//! Extraction of range samples from one assembled scan frame.
//!
//! A reply is a run of space-delimited ASCII tokens. The sample list follows a
//! marker token (`DIST1` by default), but the number of protocol fields between
//! the marker and the hexadecimal sample count differs between sensor builds.
//! Instead of a fixed offset the parser searches a short window after the
//! marker for the first token that can be the count: it parses as hex, it is a
//! plausible number of samples, and at least that many tokens follow it.

use crate::error::FrameError;
use super::protocol::preview;
use std::ops::RangeInclusive;
use tracing::debug;

/// Tokens after the marker examined as count candidates.
pub const DEFAULT_COUNT_WINDOW: usize = 12;

/// Sample counts considered plausible.
pub const PLAUSIBLE_COUNTS: RangeInclusive<usize> = 10..=2000;

/// Characters of the frame kept in diagnostics.
const HEAD_PREVIEW: usize = 120;

/// Samples decoded from one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScan {
    /// Ranges in millimeters, in angular order
    pub ranges_mm: Vec<u32>,
    /// Token index of the first sample
    pub data_offset: usize,
    /// Samples that failed to decode and were set to zero
    pub defaulted: usize,
}

/// Bounded-window scan parser.
#[derive(Debug, Clone)]
pub struct ScanFrameParser {
    marker: String,
    expected: usize,
    window: usize,
}

impl ScanFrameParser {
    /// Parser for frames carrying exactly `expected` samples after `marker`.
    pub fn new(marker: impl Into<String>, expected: usize) -> Self {
        Self {
            marker: marker.into(),
            expected,
            window: DEFAULT_COUNT_WINDOW,
        }
    }

    /// Override how many tokens after the marker are tried as the count.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Decode one frame payload (delimiters already stripped).
    ///
    /// Sample tokens that are not valid hex decode as zero and are counted in
    /// [`ParsedScan::defaulted`]; they never fail the frame.
    pub fn parse(&self, frame: &[u8]) -> Result<ParsedScan, FrameError> {
        let tokens: Vec<&[u8]> = frame
            .split(u8::is_ascii_whitespace)
            .filter(|t| !t.is_empty())
            .collect();

        let marker_at = tokens
            .iter()
            .position(|t| *t == self.marker.as_bytes())
            .ok_or_else(|| FrameError::MarkerNotFound {
                marker: self.marker.clone(),
                head: preview(frame, HEAD_PREVIEW),
            })?;

        let (count_at, count) = self
            .resolve_count(&tokens, marker_at)
            .ok_or(FrameError::CountUnresolved {
                expected: self.expected,
                found: None,
            })?;
        if count != self.expected {
            return Err(FrameError::CountUnresolved {
                expected: self.expected,
                found: Some(count),
            });
        }

        let data_offset = count_at + 1;
        let mut defaulted = 0;
        let ranges_mm = tokens[data_offset..data_offset + count]
            .iter()
            .map(|t| {
                parse_hex(t)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or_else(|| {
                        defaulted += 1;
                        0
                    })
            })
            .collect();

        if defaulted > 0 {
            debug!(defaulted, "malformed sample tokens decoded as zero");
        }

        Ok(ParsedScan {
            ranges_mm,
            data_offset,
            defaulted,
        })
    }

    /// First `(index, count)` in the window that satisfies the count heuristic.
    fn resolve_count(&self, tokens: &[&[u8]], marker_at: usize) -> Option<(usize, usize)> {
        let start = marker_at + 1;
        let end = (start + self.window).min(tokens.len());
        (start..end).find_map(|i| {
            let count = usize::try_from(parse_hex(tokens[i])?).ok()?;
            let remaining = tokens.len() - i - 1;
            (PLAUSIBLE_COUNTS.contains(&count) && remaining >= count).then_some((i, count))
        })
    }
}

/// Parse an ASCII hex token, rejecting signs and non-hex bytes.
fn parse_hex(token: &[u8]) -> Option<u64> {
    if token.is_empty() || !token.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(token).ok()?;
    u64::from_str_radix(text, 16).ok()
}
