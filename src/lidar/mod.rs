//! Range-sensor acquisition.
//!
//! - [`protocol`]: frame delimiters, request and authentication lines
//! - [`framing`]: reassembly of frames from a byte stream
//! - [`parser`]: sample extraction with the bounded-window count search
//! - [`geometry`]: polar to Cartesian conversion
//! - [`client`]: the acquisition session and its module implementation
//! - [`simulator`]: analytic scans for running without a sensor
//! - [`mock`]: loopback mock sensor for tests and the `lidar-sim` tool

pub mod client;
pub mod framing;
pub mod geometry;
pub mod mock;
pub mod parser;
pub mod protocol;
pub mod simulator;

pub use client::{AcquisitionClient, ClientState, ClientStats};
pub use framing::{FrameAssembler, FrameBuffer};
pub use geometry::{polar_to_cartesian, PolarGeometry, ANGULAR_STEP_DEG};
pub use parser::{ParsedScan, ScanFrameParser};
pub use simulator::ScanSimulator;
