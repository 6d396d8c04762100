//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! Every section has defaults, so an empty file (or no file) is valid.

use super::error::{ConfigError, ConfigResult};
use crate::port::{default_fallback_ports, LinkSettings, SUPPORTED_BAUD_RATES};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest delay or timeout accepted for any timing field, in seconds.
pub const MAX_TIMING_SECS: f64 = 86_400.0;

/// Seconds as a `Duration`, or `fallback` when `secs` is negative, NaN or
/// too large to represent.
fn secs_or(secs: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link and polling configuration
    pub device: DeviceConfig,
    /// LED indicator configuration
    pub indicator: IndicatorConfig,
    /// Simulated board configuration
    pub simulation: SimulationConfig,
    /// Port auto-detection configuration
    pub discovery: DiscoveryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values the board or the runtime would reject later.
    pub fn validate(&self) -> ConfigResult<()> {
        let device = &self.device;
        if !SUPPORTED_BAUD_RATES.contains(&device.baud_rate) {
            return Err(ConfigError::validation(
                "device.baud_rate",
                format!(
                    "{} is not one of {:?}",
                    device.baud_rate, SUPPORTED_BAUD_RATES
                ),
            ));
        }

        for (key, value) in [
            ("device.read_timeout_secs", device.read_timeout_secs),
            ("device.command_timeout_secs", device.command_timeout_secs),
            ("device.poll_interval_secs", device.poll_interval_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::validation(key, "must be a positive number of seconds"));
            }
            if value > MAX_TIMING_SECS {
                return Err(ConfigError::validation(key, "must not exceed one day"));
            }
        }
        for (key, value) in [
            ("device.boot_delay_secs", device.boot_delay_secs),
            ("device.heartbeat_interval_secs", device.heartbeat_interval_secs),
            ("device.debounce_secs", device.debounce_secs),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::validation(key, "must not be negative"));
            }
            if value > MAX_TIMING_SECS {
                return Err(ConfigError::validation(key, "must not exceed one day"));
            }
        }

        let max_ms = (MAX_TIMING_SECS * 1000.0) as u64;
        for (key, value) in [
            ("indicator.startup_step_ms", self.indicator.startup_step_ms),
            ("simulation.connect_delay_ms", self.simulation.connect_delay_ms),
            ("simulation.latency_ms", self.simulation.latency_ms),
        ] {
            if value > max_ms {
                return Err(ConfigError::validation(key, "must not exceed one day"));
            }
        }

        let probability = self.simulation.event_probability;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::validation(
                "simulation.event_probability",
                "must be between 0.0 and 1.0",
            ));
        }

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::validation(
                "logging.level",
                format!("unknown level '{}'", self.logging.level),
            ));
        }

        Ok(())
    }
}

/// Serial link and polling configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port path; empty means auto-detect
    pub port: String,
    /// Baud rate, one of 9600, 19200, 38400, 57600, 115200
    pub baud_rate: u32,
    /// Low-level read timeout in seconds (granularity of line reads)
    pub read_timeout_secs: f64,
    /// Time to wait for the reply to one command, in seconds
    pub command_timeout_secs: f64,
    /// Delay between RFID polls, in seconds
    pub poll_interval_secs: f64,
    /// Time the board needs after the port opens before it answers
    pub boot_delay_secs: f64,
    /// How often long-running callers should refresh status
    pub heartbeat_interval_secs: f64,
    /// Whether RFID monitoring is allowed
    pub rfid_enabled: bool,
    /// Window in which repeated reads of one tag are ignored
    pub debounce_secs: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            read_timeout_secs: 0.1,
            command_timeout_secs: 5.0,
            poll_interval_secs: 0.5,
            boot_delay_secs: 2.0,
            heartbeat_interval_secs: 10.0,
            rfid_enabled: true,
            debounce_secs: 2.0,
        }
    }
}

/// Duration accessors never panic: out-of-range values (which `validate`
/// rejects) fall back to the defaults.
impl DeviceConfig {
    pub fn command_timeout(&self) -> Duration {
        secs_or(self.command_timeout_secs, 5.0)
    }

    pub fn poll_interval(&self) -> Duration {
        secs_or(self.poll_interval_secs, 0.5)
    }

    pub fn boot_delay(&self) -> Duration {
        secs_or(self.boot_delay_secs, 2.0)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        secs_or(self.heartbeat_interval_secs, 10.0)
    }

    pub fn debounce_window(&self) -> Duration {
        secs_or(self.debounce_secs, 2.0)
    }

    /// Line settings for opening the port.
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            read_timeout: secs_or(self.read_timeout_secs, 0.1),
        }
    }
}

/// LED indicator configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Whether light commands are sent at all
    pub enabled: bool,
    /// Run the colour sweep after connecting
    pub startup_sequence: bool,
    /// Colour while waiting for a tag read
    pub reading_color: String,
    /// Colour while the reading is processed
    pub processing_color: String,
    /// Colour on success
    pub success_color: String,
    /// Colour on error
    pub error_color: String,
    /// Colours of the startup sweep, in order
    pub startup_colors: Vec<String>,
    /// Delay between startup sweep steps in milliseconds
    pub startup_step_ms: u64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_sequence: true,
            reading_color: "blue".to_string(),
            processing_color: "purple".to_string(),
            success_color: "green".to_string(),
            error_color: "red".to_string(),
            startup_colors: ["red", "yellow", "green", "blue", "purple"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            startup_step_ms: 300,
        }
    }
}

impl IndicatorConfig {
    pub fn startup_step(&self) -> Duration {
        Duration::from_millis(self.startup_step_ms)
    }
}

/// Simulated board configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Force the simulated board even when hardware support is available
    pub enabled: bool,
    /// Simulated connect time in milliseconds
    pub connect_delay_ms: u64,
    /// Simulated per-command latency in milliseconds
    pub latency_ms: u64,
    /// Chance that one `read_rfid` poll reports a tag
    pub event_probability: f64,
    /// Tags reported by the simulated reader, cycled in order
    pub tags: Vec<String>,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            connect_delay_ms: 500,
            latency_ms: 100,
            event_probability: 0.2,
            tags: ["123456789012", "987654321098", "111222333444", "555666777888"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Port auto-detection configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Substrings identifying the board in port descriptions
    pub identifiers: Vec<String>,
    /// Ports tried when no description matches; `*` patterns are globbed
    pub fallback_ports: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            identifiers: vec![
                "Pico".to_string(),
                "Raspberry Pi".to_string(),
                "2E8A".to_string(),
            ],
            fallback_ports: default_fallback_ports(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
