//! Core traits for the serial transport abstraction.
//!
//! `Transport` is the open connection, `Connector` opens one, and `PortLister`
//! enumerates candidate ports. Real serial ports and `MockTransport` plug in
//! behind the same traits so the channel and facade never see the difference.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Baud rates the Pico firmware accepts.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200];

/// Line settings used when opening a connection.
///
/// The board always speaks 8N1 without flow control, so only the rate and the
/// low-level read timeout are configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Timeout for a single low-level read call. Line reads loop over several
    /// of these until their own deadline expires.
    pub read_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// An open, line-delimited, half-duplex connection.
///
/// All methods block; callers on an async runtime run them on the blocking
/// pool (see `CommandChannel`).
pub trait Transport: Send + std::fmt::Debug {
    /// Name/path of the port this transport is connected to.
    fn name(&self) -> &str;

    /// Write the whole buffer to the port.
    fn write_all(&mut self, data: &[u8]) -> Result<(), PortError>;

    /// Read one `\n`-terminated line, without the terminator.
    ///
    /// Returns `Ok(None)` if no complete line arrived within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, PortError>;

    /// Drop any bytes received but not yet consumed, such as a late reply to
    /// an exchange that already timed out.
    fn discard_input(&mut self) -> Result<(), PortError>;

    /// Close the connection. Further calls fail with `PortError::NotOpen`.
    fn close(&mut self) -> Result<(), PortError>;
}

/// Opens transports. Separated from `Transport` so the live backend can be
/// handed a fake connector in tests.
pub trait Connector: Send + Sync {
    fn open(&self, port_name: &str, settings: &LinkSettings) -> Result<Box<dyn Transport>, PortError>;
}

/// A port found during enumeration, with its human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub port_name: String,
    pub description: String,
}

impl PortDescriptor {
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
        }
    }
}

/// Enumerates serial ports present on the system.
pub trait PortLister: Send + Sync {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, PortError>;
}

/// A lister with a fixed answer, for tests and for builds without hardware
/// support.
#[derive(Debug, Clone, Default)]
pub struct StaticPortLister {
    ports: Vec<PortDescriptor>,
}

impl StaticPortLister {
    pub fn new(ports: Vec<PortDescriptor>) -> Self {
        Self { ports }
    }
}

impl PortLister for StaticPortLister {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        Ok(self.ports.clone())
    }
}
