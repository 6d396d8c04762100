//! Pico Link Library
//!
//! Control layer for a Raspberry Pi Pico board with an RFID reader and an RGB
//! LED, attached over USB serial and speaking line-delimited JSON.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `error`: Device-layer error kinds
//! - `port`: Transport abstraction, serial and mock transports, port discovery
//! - `protocol`: Wire format of commands and responses
//! - `channel`: Single-flight command exchange over a transport
//! - `monitor`: Background RFID polling
//! - `device`: Live and simulated backends behind `DeviceFacade`
//! - `debounce`: Repeat suppression for tag reads

pub mod channel;
pub mod config;
pub mod debounce;
pub mod device;
pub mod error;
pub mod monitor;
pub mod port;
pub mod protocol;

// Re-export commonly used types for convenience
pub use channel::{CommandChannel, CommandExchange};
pub use config::{Config, ConfigLoader};
pub use debounce::Debouncer;
pub use device::{DeviceBackend, DeviceFacade, DeviceStatus, LiveDevice, SimulatedDevice};
pub use error::{DeviceError, DeviceResult, ErrorKind};
pub use monitor::{callback, EventCallback, EventMonitor};
pub use port::{PortError, PortResolver};
pub use protocol::{Command, Response, StatusReport};
