//! Configuration module for pico-link.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `PICO_LINK_CONFIG` environment variable (explicit path)
//! 2. `./pico-link.toml` (current directory)
//! 3. `config.toml` in the platform config directory
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Selected values can be overridden via environment variables.
//! The pattern is: `PICO_LINK_<SECTION>_<KEY>`
//!
//! Examples:
//! - `PICO_LINK_DEVICE_PORT=/dev/ttyACM1`
//! - `PICO_LINK_DEVICE_BAUD_RATE=57600`
//! - `PICO_LINK_SIMULATION_ENABLED=true`
//!
//! # Example
//!
//! ```rust,no_run
//! use pico_link::config::ConfigLoader;
//!
//! # fn main() -> Result<(), pico_link::config::ConfigError> {
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Baud rate: {}", config.device.baud_rate);
//! println!("Poll interval: {:?}", config.device.poll_interval());
//! # Ok(())
//! # }
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    Config, DeviceConfig, DiscoveryConfig, IndicatorConfig, LogFormat, LoggingConfig,
    SimulationConfig,
};
