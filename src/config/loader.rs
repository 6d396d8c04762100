//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "PICO_LINK";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file name looked up in the current directory
const LOCAL_CONFIG_FILE_NAME: &str = "pico-link.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "PICO_LINK_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `PICO_LINK_CONFIG` environment variable (explicit path)
    /// 2. `./pico-link.toml` (current directory)
    /// 3. `config.toml` in the platform config directory
    ///    (`~/.config/pico-link/` on Linux)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values, and the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path()?;

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
///
/// An explicit `PICO_LINK_CONFIG` that points nowhere is an error rather
/// than a silent fallback to defaults.
pub fn resolve_config_path() -> ConfigResult<Option<PathBuf>> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(ConfigError::ReadError {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} points to a missing file", CONFIG_PATH_ENV),
                ),
                path,
            });
        }
        return Ok(Some(path));
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Ok(Some(cwd_config));
    }

    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Ok(Some(app_config));
        }
    }

    Ok(None)
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pico-link").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read `PICO_LINK_<key>` and parse it, if set.
fn env_value<T: FromStr>(key: &str, what: &str) -> ConfigResult<Option<T>> {
    let var = format!("{}_{}", ENV_PREFIX, key);
    match std::env::var(&var) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, what.to_string())),
        Err(_) => Ok(None),
    }
}

fn env_flag(key: &str) -> ConfigResult<Option<bool>> {
    let var = format!("{}_{}", ENV_PREFIX, key);
    match std::env::var(&var) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::env_parse(var, "Expected true or false")),
        },
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `PICO_LINK_<SECTION>_<KEY>`
/// For example:
/// - `PICO_LINK_DEVICE_PORT=/dev/ttyACM1`
/// - `PICO_LINK_DEVICE_BAUD_RATE=57600`
/// - `PICO_LINK_SIMULATION_ENABLED=true`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Device overrides
    if let Some(val) = env_value::<String>("DEVICE_PORT", "Invalid port")? {
        config.device.port = val;
    }
    if let Some(val) = env_value("DEVICE_BAUD_RATE", "Invalid baud rate")? {
        config.device.baud_rate = val;
    }
    if let Some(val) = env_value("DEVICE_COMMAND_TIMEOUT_SECS", "Invalid timeout")? {
        config.device.command_timeout_secs = val;
    }
    if let Some(val) = env_value("DEVICE_POLL_INTERVAL_SECS", "Invalid interval")? {
        config.device.poll_interval_secs = val;
    }
    if let Some(val) = env_value("DEVICE_BOOT_DELAY_SECS", "Invalid delay")? {
        config.device.boot_delay_secs = val;
    }
    if let Some(val) = env_flag("DEVICE_RFID_ENABLED")? {
        config.device.rfid_enabled = val;
    }

    // Indicator overrides
    if let Some(val) = env_flag("INDICATOR_ENABLED")? {
        config.indicator.enabled = val;
    }
    if let Some(val) = env_flag("INDICATOR_STARTUP_SEQUENCE")? {
        config.indicator.startup_sequence = val;
    }

    // Simulation overrides
    if let Some(val) = env_flag("SIMULATION_ENABLED")? {
        config.simulation.enabled = val;
    }
    if let Some(val) = env_value("SIMULATION_SEED", "Invalid seed")? {
        config.simulation.seed = Some(val);
    }

    // Logging overrides
    if let Some(val) = env_value::<String>("LOGGING_LEVEL", "Invalid level")? {
        config.logging.level = val;
    }
    if let Some(val) = env_value::<String>("LOGGING_FORMAT", "Invalid format")? {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    format!("{}_LOGGING_FORMAT", ENV_PREFIX),
                    "Expected json, pretty or compact",
                ))
            }
        };
    }

    Ok(())
}
