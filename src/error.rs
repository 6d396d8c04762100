use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::port::PortError;

/// Classification of device-layer failures.
///
/// Command-level kinds (`NotConnected`, `Timeout`, `ProtocolError`,
/// `DeviceError`, `Transport`) travel inside error `Response`s; connection
/// kinds (`PortNotFound`, `ConnectFailed`) come back from backend `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Operation attempted while the transport is closed.
    NotConnected,
    /// Port discovery exhausted every strategy.
    PortNotFound,
    /// Opening the transport or the status handshake failed.
    ConnectFailed,
    /// No reply within the command timeout.
    Timeout,
    /// Reply line could not be decoded.
    ProtocolError,
    /// The device answered `status: error`.
    DeviceError,
    /// The link failed underneath an exchange and was closed.
    Transport,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotConnected => "not connected",
            Self::PortNotFound => "port not found",
            Self::ConnectFailed => "connect failed",
            Self::Timeout => "timeout",
            Self::ProtocolError => "protocol error",
            Self::DeviceError => "device error",
            Self::Transport => "transport failure",
        };
        f.write_str(name)
    }
}

/// Device-layer error: a kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct DeviceError {
    kind: ErrorKind,
    message: String,
}

impl DeviceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn port_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PortNotFound, message)
    }

    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectFailed, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Opening a port is the only place a `PortError` escapes the channel, so the
/// conversion is a connect failure (or a missing port).
impl From<PortError> for DeviceError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(_) => Self::port_not_found(err.to_string()),
            other => Self::connect_failed(other.to_string()),
        }
    }
}

/// A specialized `Result` type for device-layer operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
