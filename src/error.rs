//! Custom error types for the harness.
//!
//! Errors are split by how the acquisition loop reacts to them:
//!
//! - **`AcquisitionError`**: transport and session failures. Every variant is
//!   terminal for the current acquisition session; the client stops and the
//!   failure is only observable through the log.
//! - **`FrameError`**: a single scan frame could not be interpreted. The frame
//!   is skipped and streaming continues with the next request.
//! - **`HarnessError`**: process-level failures (configuration, thread
//!   spawning, operator input) surfaced to the binary.
//!
//! Malformed individual range tokens are not errors at all: the parser decodes
//! them as zero and counts them in [`crate::lidar::parser::ParsedScan`].

use thiserror::Error;

/// Convenience alias for results using the harness error type.
pub type AppResult<T> = std::result::Result<T, HarnessError>;

/// Terminal failures of an acquisition session.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// The TCP connection to the range sensor could not be opened.
    #[error("Failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        /// `host:port` that was dialled
        endpoint: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// The sensor answered the identifier line without `OK`.
    #[error("Authentication rejected, response: {response:?}")]
    AuthFailed {
        /// Lossy ASCII rendering of what the sensor sent back
        response: String,
    },

    /// The peer closed the connection (read returned zero bytes).
    #[error("Connection closed by sensor")]
    ConnectionClosed,

    /// A read or write on the connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(#[from] std::io::Error),
}

/// Recoverable failures while interpreting one assembled frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The marker token was not present in the frame.
    #[error("Marker '{marker}' not found, head={head:?}")]
    MarkerNotFound {
        /// Marker that was searched for
        marker: String,
        /// First characters of the frame, for diagnostics
        head: String,
    },

    /// No plausible sample count could be located after the marker, or the
    /// located count differs from the expected one.
    #[error("Sample count unresolved (expected {expected}, found {found:?})")]
    CountUnresolved {
        /// Sample count the buffer requires
        expected: usize,
        /// Count that the window search settled on, if any
        found: Option<usize>,
    },
}

/// Primary error type for the harness process.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration sources could not be merged or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O failure outside the acquisition session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A module thread could not be started.
    #[error("Failed to spawn thread for module '{module}': {source}")]
    ThreadSpawn {
        /// Module name
        module: &'static str,
        /// Error returned by the thread builder
        #[source]
        source: std::io::Error,
    },

    /// The operator input source failed.
    #[error("Operator input error: {0}")]
    Input(String),
}

impl From<figment::Error> for HarnessError {
    fn from(value: figment::Error) -> Self {
        HarnessError::Config(Box::new(value))
    }
}
