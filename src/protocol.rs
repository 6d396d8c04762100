//! Line-oriented JSON protocol spoken by the Pico firmware.
//!
//! Every request and every reply is one JSON object on one `\n`-terminated
//! line. Requests carry `command`, an informational `timestamp` and the
//! command's parameters at top level; replies carry `status`, and optionally
//! `data` (on success) or `message` (on error).

use crate::error::{DeviceError, ErrorKind};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const GET_STATUS: &str = "get_status";
pub const SET_LIGHT: &str = "set_light";
pub const READ_RFID: &str = "read_rfid";

/// Upper bound of the firmware's brightness scale.
pub const MAX_BRIGHTNESS: u8 = 100;

/// A request to the device. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    params: Map<String, Value>,
    issued_at: f64,
}

impl Command {
    /// A command with no parameters, stamped with the current time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
            issued_at: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
        }
    }

    /// Add a scalar parameter. `command` and `timestamp` are reserved and
    /// always win over parameters of the same name.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get_status() -> Self {
        Self::new(GET_STATUS)
    }

    /// `brightness` is clamped to `0..=100`.
    pub fn set_light(color: impl Into<String>, brightness: u8) -> Self {
        Self::new(SET_LIGHT)
            .with_param("color", color.into())
            .with_param("brightness", brightness.min(MAX_BRIGHTNESS))
    }

    pub fn read_rfid() -> Self {
        Self::new(READ_RFID)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Seconds since the Unix epoch when the command was built.
    pub fn issued_at(&self) -> f64 {
        self.issued_at
    }

    /// Encode as a single wire line, terminator included.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut record = self.params.clone();
        record.insert("command".into(), Value::String(self.name.clone()));
        record.insert("timestamp".into(), Value::from(self.issued_at));

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        Ok(line)
    }
}

/// Reply status as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Outcome of one command: a decoded device reply or a locally produced error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Local classification; never on the wire.
    #[serde(skip)]
    kind: Option<ErrorKind>,
}

impl Response {
    pub fn ok(data: Option<Map<String, Value>>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            data,
            message: None,
            kind: None,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            message: Some(message.into()),
            kind: Some(kind),
        }
    }

    pub fn not_connected() -> Self {
        Self::error(ErrorKind::NotConnected, "Not connected")
    }

    /// Decode one reply line. Anything that is not a valid reply object comes
    /// back as a `ProtocolError` response rather than an `Err`.
    pub fn decode(line: &str) -> Self {
        match serde_json::from_str::<Response>(line.trim()) {
            Ok(mut response) => {
                if response.status == ResponseStatus::Error {
                    response.kind = Some(ErrorKind::DeviceError);
                }
                response
            }
            Err(e) => Self::error(
                ErrorKind::ProtocolError,
                format!("Invalid reply {line:?}: {e}"),
            ),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Error classification; `None` for successful responses.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Look up one field of the `data` object.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }

    /// Error responses as a `DeviceError`.
    pub fn to_error(&self) -> Option<DeviceError> {
        if self.is_ok() {
            return None;
        }
        let kind = self.kind.unwrap_or(ErrorKind::DeviceError);
        let message = self.message.clone().unwrap_or_else(|| kind.to_string());
        Some(DeviceError::new(kind, message))
    }

    /// Parse the payload of a successful `get_status` reply.
    pub fn status_report(&self) -> Result<StatusReport, DeviceError> {
        if let Some(err) = self.to_error() {
            return Err(err);
        }
        let data = Value::Object(self.data.clone().unwrap_or_default());
        serde_json::from_value(data).map_err(|e| {
            DeviceError::new(ErrorKind::ProtocolError, format!("Malformed status data: {e}"))
        })
    }

    /// The tag id of a successful `read_rfid` reply; `None` when no tag was
    /// seen (null, missing or empty).
    pub fn rfid(&self) -> Option<&str> {
        if !self.is_ok() {
            return None;
        }
        self.field("rfid")
            .and_then(Value::as_str)
            .filter(|tag| !tag.is_empty())
    }
}

/// Payload of a `get_status` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default = "unknown_version")]
    pub firmware_version: String,
    #[serde(default)]
    pub uptime: f64,
    #[serde(default)]
    pub rfid_enabled: bool,
    #[serde(default)]
    pub lights_enabled: bool,
}

fn unknown_version() -> String {
    "unknown".to_string()
}
