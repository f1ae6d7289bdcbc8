//! Analytic scan source used when acquisition runs without a sensor.
//!
//! Each call produces one scan of `r(θ) = 5 m + 2 m · sin(2θ + φ)` in
//! millimeters and advances the phase `φ`, so consecutive scans differ.

use super::geometry::PolarGeometry;

/// Mean synthesized range, millimeters.
const BASE_RANGE_MM: f64 = 5000.0;

/// Amplitude of the synthesized ripple, millimeters.
const RIPPLE_MM: f64 = 2000.0;

/// Phase advance per scan, radians.
pub const PHASE_STEP: f64 = 0.05;

/// Generator of synthetic range scans.
#[derive(Debug, Clone)]
pub struct ScanSimulator {
    geometry: PolarGeometry,
    samples: usize,
    phase: f64,
}

impl ScanSimulator {
    /// Simulator producing `samples` ranges per scan.
    pub fn new(samples: usize) -> Self {
        Self {
            geometry: PolarGeometry::default(),
            samples,
            phase: 0.0,
        }
    }

    /// Current phase, radians.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Next scan of ranges in millimeters.
    pub fn next_ranges(&mut self) -> Vec<u32> {
        let phase = self.phase;
        self.phase += PHASE_STEP;
        (0..self.samples)
            .map(|i| {
                let theta = self.geometry.angle_rad(i);
                let r = BASE_RANGE_MM + RIPPLE_MM * (2.0 * theta + phase).sin();
                r.round() as u32
            })
            .collect()
    }
}
