//! Polar to Cartesian conversion for range samples.

use crate::shared::{Scan, ScanSample};

/// Angular spacing between consecutive samples, degrees.
pub const ANGULAR_STEP_DEG: f64 = 0.5;

/// Angular layout of a scan: sample `i` lies at `start_deg + i * step_deg`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarGeometry {
    /// Angle of sample 0, degrees
    pub start_deg: f64,
    /// Spacing between samples, degrees
    pub step_deg: f64,
}

impl Default for PolarGeometry {
    fn default() -> Self {
        Self {
            start_deg: 0.0,
            step_deg: ANGULAR_STEP_DEG,
        }
    }
}

impl PolarGeometry {
    /// Angle of sample `index`, radians.
    pub fn angle_rad(&self, index: usize) -> f64 {
        (self.start_deg + index as f64 * self.step_deg).to_radians()
    }

    /// Convert a range in millimeters at sample `index` to meters in x/y.
    pub fn to_cartesian(&self, range_mm: u32, index: usize) -> ScanSample {
        let r = f64::from(range_mm) / 1000.0;
        let (sin, cos) = self.angle_rad(index).sin_cos();
        ScanSample::new(r * cos, r * sin)
    }

    /// Convert a full scan into `out`. Indices without a range are zeroed.
    pub fn convert_into(&self, ranges_mm: &[u32], out: &mut Scan) {
        for (i, sample) in out.iter_mut().enumerate() {
            *sample = ranges_mm
                .get(i)
                .map_or_else(ScanSample::default, |&r| self.to_cartesian(r, i));
        }
    }
}

/// [`PolarGeometry::to_cartesian`] with the default 0° start and 0.5° step.
pub fn polar_to_cartesian(range_mm: u32, index: usize) -> ScanSample {
    PolarGeometry::default().to_cartesian(range_mm, index)
}
