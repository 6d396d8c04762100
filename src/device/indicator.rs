//! Named indicator states and the colours they light up.

use crate::config::IndicatorConfig;
use std::fmt;

/// Colour the board settles on when nothing is happening.
pub const IDLE_COLOR: &str = "dim_blue";
/// Colour name the firmware treats as "LEDs off".
pub const OFF_COLOR: &str = "off";
/// Colour used for state names nobody configured.
pub const DEFAULT_COLOR: &str = "white";

/// A semantic indicator state. Unknown names are kept so they can be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorState {
    Reading,
    Processing,
    Success,
    Error,
    Idle,
    Off,
    Unknown(String),
}

impl IndicatorState {
    /// Colour for this state under `config`.
    pub fn color<'a>(&'a self, config: &'a IndicatorConfig) -> &'a str {
        match self {
            Self::Reading => &config.reading_color,
            Self::Processing => &config.processing_color,
            Self::Success => &config.success_color,
            Self::Error => &config.error_color,
            Self::Idle => IDLE_COLOR,
            Self::Off => OFF_COLOR,
            Self::Unknown(_) => DEFAULT_COLOR,
        }
    }
}

impl From<&str> for IndicatorState {
    fn from(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "reading" => Self::Reading,
            "processing" => Self::Processing,
            "success" => Self::Success,
            "error" => Self::Error,
            "idle" => Self::Idle,
            "off" => Self::Off,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reading => f.write_str("reading"),
            Self::Processing => f.write_str("processing"),
            Self::Success => f.write_str("success"),
            Self::Error => f.write_str("error"),
            Self::Idle => f.write_str("idle"),
            Self::Off => f.write_str("off"),
            Self::Unknown(name) => f.write_str(name),
        }
    }
}
