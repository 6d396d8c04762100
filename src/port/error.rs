//! Transport-level error types.
//!
//! Kept separate from the device-level `DeviceError` so the transport layer
//! does not need to know about commands, responses or fallback policy.

use std::io::ErrorKind as IoKind;
use thiserror::Error;

/// Errors that can occur while talking to a serial transport.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested serial port does not exist on this system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred on an open port.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port could not be configured (bad baud rate, bad path, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A read did not complete before its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The transport has been closed or was never opened.
    #[error("Port is not open")]
    NotOpen,

    /// The received bytes were not valid UTF-8 text.
    #[error("Received non UTF-8 line: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// A serialport-specific error occurred.
    #[cfg(feature = "hardware")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Whether this error means the connection can no longer be used.
    ///
    /// Timeouts, would-block and interrupted reads are transient; undecodable
    /// bytes are a framing problem, not a dead link.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Encoding(_) | Self::Config(_) => false,
            Self::Io(e) => !matches!(
                e.kind(),
                IoKind::TimedOut | IoKind::WouldBlock | IoKind::Interrupted
            ),
            _ => true,
        }
    }
}
