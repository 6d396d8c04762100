//! Configuration loading tests.
//!
//! These mutate process environment variables, so every test runs `#[serial]`.

use pico_link::config::{ConfigError, ConfigLoader, LogFormat};
use serial_test::serial;
use std::env;
use std::time::Duration;

const CONFIG_ENV: &str = "PICO_LINK_CONFIG";

struct EnvGuard(&'static [&'static str]);

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for var in self.0 {
            env::remove_var(var);
        }
    }
}

#[test]
#[serial]
fn test_explicit_config_file_is_loaded() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.toml");
    std::fs::write(
        &path,
        r#"
            [device]
            port = "/dev/ttyACM7"
            command_timeout_secs = 1.5

            [indicator]
            startup_colors = ["white", "off"]

            [logging]
            format = "json"
        "#,
    )
    .unwrap();
    let _guard = EnvGuard(&[CONFIG_ENV]);
    env::set_var(CONFIG_ENV, &path);

    // Act
    let loader = ConfigLoader::load().unwrap();

    // Assert
    let config = loader.config();
    assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.device.port, "/dev/ttyACM7");
    assert_eq!(config.device.command_timeout(), Duration::from_millis(1500));
    assert_eq!(config.indicator.startup_colors, vec!["white", "off"]);
    assert_eq!(config.logging.format, LogFormat::Json);
    // Untouched sections keep their defaults
    assert_eq!(config.simulation.tags.len(), 4);
}

#[test]
#[serial]
fn test_env_overrides_beat_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.toml");
    std::fs::write(&path, "[device]\nport = \"/dev/ttyACM7\"\nbaud_rate = 9600\n").unwrap();
    let _guard = EnvGuard(&[
        CONFIG_ENV,
        "PICO_LINK_DEVICE_PORT",
        "PICO_LINK_INDICATOR_ENABLED",
    ]);
    env::set_var(CONFIG_ENV, &path);
    env::set_var("PICO_LINK_DEVICE_PORT", "/dev/ttyUSB3");
    env::set_var("PICO_LINK_INDICATOR_ENABLED", "false");

    let config = ConfigLoader::load().unwrap().into_config();

    assert_eq!(config.device.port, "/dev/ttyUSB3");
    assert_eq!(config.device.baud_rate, 9600);
    assert!(!config.indicator.enabled);
}

#[test]
#[serial]
fn test_invalid_override_is_rejected() {
    let _guard = EnvGuard(&["PICO_LINK_SIMULATION_ENABLED"]);
    env::set_var("PICO_LINK_SIMULATION_ENABLED", "maybe");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.toml");
    std::fs::write(&path, "").unwrap();

    assert!(matches!(
        ConfigLoader::load_from(&path),
        Err(ConfigError::EnvParseError { .. })
    ));
}

#[test]
#[serial]
fn test_malformed_file_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[device\nport = ").unwrap();

    assert!(matches!(
        ConfigLoader::load_from(&path),
        Err(ConfigError::ParseError(_))
    ));
}
