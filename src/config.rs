//! Harness configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (`HarnessConfig::default()`)
//! 2. `config/harness.toml` (or an explicit path; a missing file is ignored)
//! 3. Environment variables prefixed with `UGV_`, using `__` for nesting
//!
//! # Example
//! ```no_run
//! use ugv_harness::config::HarnessConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // UGV_LIDAR__PORT=23001 overrides [lidar] port
//! let config = HarnessConfig::load()?;
//! println!("Sensor endpoint: {}", config.lidar.endpoint());
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, HarnessError};
use crate::lidar::protocol::{
    DEFAULT_CARRY_LIMIT, DEFAULT_COMMAND, DEFAULT_HOST, DEFAULT_MARKER, DEFAULT_PORT,
    DEFAULT_READ_CHUNK, ETX, STX,
};
use crate::tracing_setup::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/harness.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "UGV_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Range-sensor acquisition settings
    pub lidar: LidarConfig,
    /// Placeholder module cycle intervals
    pub modules: ModuleIntervals,
    /// Supervisor loop settings
    pub supervisor: SupervisorConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "UGV Harness".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
        }
    }
}

/// Where scans come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// Connect to the range-sensor simulator over TCP
    #[default]
    Network,
    /// Synthesize scans analytically, no connection
    Simulate,
}

/// Whether the session starts with an identifier line.
///
/// Only some sensor builds expect authentication, so this is never inferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AuthPolicy {
    /// Go straight to streaming after connecting
    #[default]
    None,
    /// Send `identifier\n` and require a response containing `OK`
    Identifier {
        /// Identifier string sent to the sensor
        identifier: String,
    },
}

/// Range-sensor acquisition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidarConfig {
    /// Network or simulated acquisition
    pub mode: AcquisitionMode,
    /// Sensor host
    pub host: String,
    /// Sensor TCP port
    pub port: u16,
    /// Session authentication
    pub auth: AuthPolicy,
    /// Request command text placed between STX and ETX
    pub command: String,
    /// Field name preceding the sample count
    pub marker: String,
    /// Carry buffer ceiling in bytes before it is discarded
    pub carry_limit: usize,
    /// Size of a single socket read
    pub read_chunk: usize,
    /// Upper bound for the authentication response read
    pub auth_response_limit: usize,
    /// Sleep between request/response cycles
    pub poll_interval_ms: u64,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Socket read timeout (0 = block forever)
    pub read_timeout_ms: u64,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            mode: AcquisitionMode::Network,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auth: AuthPolicy::None,
            command: DEFAULT_COMMAND.to_string(),
            marker: DEFAULT_MARKER.to_string(),
            carry_limit: DEFAULT_CARRY_LIMIT,
            read_chunk: DEFAULT_READ_CHUNK,
            auth_response_limit: 1024,
            poll_interval_ms: 40,
            connect_timeout_ms: 3000,
            read_timeout_ms: 5000,
        }
    }
}

impl LidarConfig {
    /// `host:port` string for connecting and logging
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sleep between cycles
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout, `None` when reads block indefinitely
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

/// Sleep intervals of the placeholder modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleIntervals {
    /// Display module cycle
    pub display_ms: u64,
    /// GNSS module cycle
    pub gnss_ms: u64,
    /// Controller module cycle
    pub controller_ms: u64,
    /// Vehicle control module cycle
    pub vehicle_control_ms: u64,
    /// Crash avoidance module cycle
    pub crash_avoidance_ms: u64,
}

impl Default for ModuleIntervals {
    fn default() -> Self {
        Self {
            display_ms: 200,
            gnss_ms: 150,
            controller_ms: 80,
            vehicle_control_ms: 100,
            crash_avoidance_ms: 90,
        }
    }
}

impl ModuleIntervals {
    fn named(&self) -> [(&'static str, u64); 5] {
        [
            ("display_ms", self.display_ms),
            ("gnss_ms", self.gnss_ms),
            ("controller_ms", self.controller_ms),
            ("vehicle_control_ms", self.vehicle_control_ms),
            ("crash_avoidance_ms", self.crash_avoidance_ms),
        ]
    }
}

/// What the supervisor does when the acquisition thread ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionExitPolicy {
    /// Log once and keep the other modules running (fail-stop sensor)
    #[default]
    Log,
    /// Treat it as a shutdown request for the whole harness
    Shutdown,
}

/// Supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Quit-key poll window and heartbeat clear period
    pub poll_interval_ms: u64,
    /// Reaction to an acquisition thread that ended before shutdown
    pub on_acquisition_exit: AcquisitionExitPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            on_acquisition_exit: AcquisitionExitPolicy::Log,
        }
    }
}

impl SupervisorConfig {
    /// Supervisor cycle period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from `config/harness.toml` and environment variables
    ///
    /// Environment variables can override configuration with prefix `UGV_`.
    /// Example: `UGV_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and validate it
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(HarnessConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment layer)
    pub fn from_toml_str(source: &str) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(HarnessConfig::default()))
            .merge(Toml::string(source))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| HarnessError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(HarnessError::Configuration(msg));

        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        let lidar = &self.lidar;
        if !(1..=1000).contains(&lidar.poll_interval_ms) {
            return invalid(format!(
                "Invalid lidar.poll_interval_ms {}. Must be 1-1000",
                lidar.poll_interval_ms
            ));
        }
        if lidar.read_chunk == 0 {
            return invalid("lidar.read_chunk must be greater than 0".to_string());
        }
        if lidar.carry_limit < lidar.read_chunk {
            return invalid(format!(
                "lidar.carry_limit ({}) must be at least lidar.read_chunk ({})",
                lidar.carry_limit, lidar.read_chunk
            ));
        }
        if lidar.auth_response_limit == 0 {
            return invalid("lidar.auth_response_limit must be greater than 0".to_string());
        }
        if lidar.command.is_empty() {
            return invalid("lidar.command must not be empty".to_string());
        }
        if lidar.command.bytes().any(|b| b == STX || b == ETX) {
            return invalid("lidar.command must not contain frame delimiters".to_string());
        }
        if lidar.marker.trim().is_empty() {
            return invalid("lidar.marker must not be empty".to_string());
        }
        if lidar.mode == AcquisitionMode::Network && lidar.port == 0 {
            return invalid("lidar.port must be non-zero in network mode".to_string());
        }
        if let AuthPolicy::Identifier { identifier } = &lidar.auth {
            if identifier.trim().is_empty() {
                return invalid("lidar.auth.identifier must not be empty".to_string());
            }
        }

        for (name, value) in self.modules.named() {
            if !(1..=5000).contains(&value) {
                return invalid(format!("Invalid modules.{name} {value}. Must be 1-5000"));
            }
        }

        if self.supervisor.poll_interval_ms == 0 {
            return invalid("supervisor.poll_interval_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}
